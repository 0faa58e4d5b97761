use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::config::WebPreset;

/// Everything except ASCII alphanumerics, `-._~` and `/` is escaped.
const QUERY_TEXT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

pub fn encode_text(text: &str) -> String {
    utf8_percent_encode(text, QUERY_TEXT).to_string()
}

impl WebPreset {
    pub fn url_for(&self, text: &str) -> String {
        format!("{}{}", self.url_prefix, encode_text(text))
    }
}

pub fn find_preset<'a>(presets: &'a [WebPreset], name: &str) -> Option<&'a WebPreset> {
    presets.iter().find(|preset| preset.name == name)
}
