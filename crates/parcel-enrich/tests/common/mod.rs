//! Shared fixture site for the pipeline tests.
//!
//! Mirrors the shape of the real site closely enough for the default
//! selectors: region and county menus, a "Property Search" quick-link,
//! a terms dialog, a collapsed address search, a results grid and detail
//! pages in both valuation layouts.

#![allow(dead_code)]

use std::sync::Arc;

use parcel_enrich::batch::{ColumnNames, InputTable, Pacing, RunOptions};
use parcel_enrich::driver::fixture::{FixtureFactory, FixtureSite};
use parcel_enrich::SiteProfile;

pub const HOME: &str = "https://county.test/";

pub fn profile() -> Arc<SiteProfile> {
    Arc::new(SiteProfile {
        home_url: HOME.into(),
        app_url_template: "https://county.test/Application.aspx?AppID={app_id}&PageTypeID=2".into(),
        step_timeout_ms: 40,
        probe_timeout_ms: 10,
        ..SiteProfile::default()
    })
}

pub fn options(limit: Option<usize>) -> RunOptions {
    RunOptions {
        limit,
        pacing: Pacing::none(),
    }
}

fn app_page() -> &'static str {
    r##"<html><body>
      <div class="modal in" aria-label="Terms and Conditions">
        <p>Terms and Conditions</p>
        <a data-dismiss="modal" data-remove="div.modal.in">Agree</a>
      </div>
      <a data-toggle="collapse" data-reveal="#addressPanel">Search by Location Address</a>
      <div id="addressPanel" data-hidden>
        <input id="ctlBodyPane_ctl01_ctl01_txtAddress">
        <a id="ctlBodyPane_ctl01_ctl01_btnSearch" data-search="input[id$='txtAddress']">Search</a>
      </div>
    </body></html>"##
}

fn detail_page(parcel: &str, class: &str, valuation: &str, photo: &str) -> String {
    format!(
        r#"<html><body>
        <section id="ctlBodyPane_ctl00_mSection_Summary">
          <table class="tabular-data-two-column">
            <tr><th>Parcel Number</th><td>{parcel}</td></tr>
            <tr><th>Class</th><td>{class}</td></tr>
            <tr><th>Tax District</th><td>Unincorporated (District 01)</td></tr>
            <tr><th>Acres</th><td>0.92</td></tr>
          </table>
        </section>
        {valuation}
        {photo}
        </body></html>"#
    )
}

pub fn site() -> FixtureSite {
    let per_year = r#"<section id="ctlBodyPane_ctl07_mSection_Valuation"><table>
        <tr><th>Year</th><th>Land Value</th><th>Building Value</th><th>Total Value</th></tr>
        <tr><td>2024</td><td>$20,000</td><td>$130,400</td><td>$150,400</td></tr>
        <tr><td>2023</td><td>$20,000</td><td>$121,000</td><td>$141,000</td></tr>
        <tr><td>2022</td><td>$18,000</td><td>$110,000</td><td>$128,000</td></tr>
        <tr><td>2021</td><td>$18,000</td><td>$99,500</td><td>$117,500</td></tr>
      </table></section>"#;
    let current_value = r#"<table id="ctlBodyPane_ctl05_gvwValuation">
        <tr><th></th><th>2020</th><th>2021</th><th>2022</th><th>2023</th><th>2024</th></tr>
        <tr><th>Current Value</th><td>$61,000</td><td>$64,250</td></tr>
      </table>"#;

    FixtureSite::new()
        .page(
            HOME,
            r#"<html><body>
              <input id="stateMenuButton">
              <div id="stateMenuContent">
                <div class="dropdown-option" id="state-option-Georgia">Georgia</div>
              </div>
              <input id="areaMenuButton">
              <div id="areaMenuContent">
                <a class="dropdown-option all-option" href="/">All</a>
                <a class="dropdown-option" href="/area/appling">Appling County, GA</a>
                <a class="dropdown-option" href="/area/columbia">Columbia County, GA</a>
              </div>
            </body></html>"#,
        )
        .page(
            "https://county.test/area/appling",
            r#"<a href="/Application.aspx?AppID=712&PageTypeID=2"><h3>Property Search</h3></a>"#,
        )
        .page(
            "https://county.test/area/columbia",
            r#"<a href="/Application.aspx?AppID=800&PageTypeID=2"><h3>Property Search</h3></a>"#,
        )
        .page(
            "https://county.test/Application.aspx?AppID=712&PageTypeID=2",
            app_page(),
        )
        .page(
            "https://county.test/Application.aspx?AppID=800&PageTypeID=2",
            app_page(),
        )
        .page(
            "https://county.test/parcel/001",
            detail_page(
                "001 042",
                "R3-Residential",
                per_year,
                r#"<img id="ctlBodyPane_imgPhoto" src="/photos/001.jpg">"#,
            ),
        )
        .page(
            "https://county.test/parcel/002",
            detail_page("002 117", "A5-Agricultural", current_value, ""),
        )
        .page(
            "https://county.test/parcel/003",
            detail_page("003 009", "C1-Commercial", "", ""),
        )
        .page(
            "https://county.test/results/oak",
            r#"<table id="ctlBodyPane_gvwParcelResults"><tbody>
                 <tr><td><a href="/parcel/002">002 117</a></td><td>2 OAK AVE</td></tr>
                 <tr><td><a href="/parcel/001">001 042</a></td><td>2 OAK AVE UNIT B</td></tr>
               </tbody></table>"#,
        )
        .page(
            "https://county.test/results/none",
            "<div class=\"alert\">No results match your search criteria.</div>",
        )
        .search("1 Main St", "https://county.test/parcel/001")
        .search("2 Oak Ave", "https://county.test/results/oak")
        .search("3 Pine Rd", "https://county.test/parcel/003")
        .no_results("https://county.test/results/none")
}

pub fn factory() -> FixtureFactory {
    FixtureFactory::new(site())
}

pub const INPUT: &str = "\
Owner,Street Address,County
SMITH,1 Main St,Appling
JONES,2 Oak Ave,Columbia
BROWN,100 Main St,Appling
WHITE,3 Pine Rd,Appling
GREEN,,Appling
BLACK,1 Main St,Nowhere
";

pub fn input(csv: &str) -> InputTable {
    InputTable::from_reader(csv.as_bytes(), &ColumnNames::default()).unwrap()
}

pub const YEARS: [i32; 5] = [2020, 2021, 2022, 2023, 2024];
