//! Display page assembly: the wiki header and footer templates wrapped
//! around the transformed article body.

use chrono::{Datelike, NaiveDate};
use scisource_core::{FrontMatter, Paper};

const GENERATOR: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// `title` is the resolved article title, which may come from the JATS
/// front matter when the feed has none.
pub fn header(paper: &Paper, title: &str, front: &FrontMatter) -> String {
    let (given, surname) = front
        .first_author
        .as_ref()
        .map(|a| (a.given_names.as_str(), a.surname.as_str()))
        .unwrap_or_default();
    format!(
        "{{{{articleheader\n\
         | title = {title}\n\
         | publication_date = {}\n\
         | initial_author_first = {given}\n\
         | initial_author_last = {surname}\n\
         | wikidata_code = {}\n\
         | Generator = {GENERATOR}\n\
         }}}}\n",
        paper.date.value,
        paper.item_label.value,
    )
}

pub fn footer(paper: &Paper, batch_date: NaiveDate) -> String {
    format!(
        "{{{{articlefooter\n\
         | pmcid = {}\n\
         | license = {}\n\
         | main_subject = {}\n\
         | batch_date = {}-{}-{}\n\
         }}}}\n",
        paper.pmcid.value,
        paper.license_label.value,
        paper.main_subject_label.value,
        batch_date.year(),
        batch_date.month(),
        batch_date.day(),
    )
}

/// Header, transformed body, footer.
pub fn display_page(header: &str, body: &[u8], footer: &str) -> Vec<u8> {
    let mut page = Vec::with_capacity(header.len() + body.len() + footer.len());
    page.extend_from_slice(header.as_bytes());
    page.extend_from_slice(body);
    page.extend_from_slice(footer.as_bytes());
    page
}
