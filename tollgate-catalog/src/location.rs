//! Search location resolution.
//!
//! Free-text locations ("Dallas, TX", "Dallas County, TX", "75201") are
//! turned into the structured location filter the search API expects. The
//! autocomplete endpoint is asked first; when it fails or returns nothing,
//! the text is parsed locally.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tollgate_fetch::{OutboundRequest, RequestKind, SessionManager};
use tracing::{debug, instrument};

use crate::descriptor::CatalogDescriptor;
use crate::response::first_autocomplete_match;

/// State of a few well-known ZIP codes, used when autocomplete is down.
const ZIP_STATES: &[(&str, &str)] = &[
    ("10001", "NY"),
    ("33101", "FL"),
    ("46201", "IN"),
    ("60601", "IL"),
    ("75201", "TX"),
    ("90001", "CA"),
];

// ============================================================================
// Location
// ============================================================================

/// Kind of area a location covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchType {
    /// County or neighborhood.
    #[serde(rename = "N")]
    County,
    /// City.
    #[serde(rename = "C")]
    City,
    /// ZIP code.
    #[serde(rename = "Z")]
    Zip,
}

impl SearchType {
    /// Parses the API's one-letter code. Unknown codes are treated as cities.
    pub fn from_code(code: &str) -> Self {
        match code {
            "N" => Self::County,
            "Z" => Self::Zip,
            _ => Self::City,
        }
    }
}

/// Structured location filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Area kind.
    #[serde(rename = "searchType")]
    pub search_type: SearchType,
    /// Display title, e.g. `"Dallas, TX"`.
    pub title: String,
    /// Two-letter state code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// County name, for county searches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    /// City name, for city searches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// ZIP code, for ZIP searches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

impl Location {
    fn new(search_type: SearchType, title: impl Into<String>) -> Self {
        Self {
            search_type,
            title: title.into(),
            state: None,
            county: None,
            city: None,
            zip: None,
        }
    }

    /// Parses free text without contacting the catalog.
    ///
    /// - `"X County, ST"` is a county
    /// - `"City, ST"` is a city
    /// - five digits are a ZIP code
    /// - anything else is a city
    pub fn parse(text: &str) -> Self {
        let text = text.trim();

        if let Some((place, rest)) = text.split_once(',') {
            let place = place.trim();
            let state = rest.split(',').next().unwrap_or_default().trim();
            let state = (!state.is_empty()).then(|| state.to_string());

            if let Some(county) = strip_county(place) {
                return Self {
                    county: Some(county),
                    state,
                    ..Self::new(SearchType::County, text)
                };
            }
            return Self {
                city: Some(place.to_string()),
                state,
                ..Self::new(SearchType::City, text)
            };
        }

        if text.len() == 5 && text.bytes().all(|b| b.is_ascii_digit()) {
            let state = zip_state(text);
            let title = match state {
                Some(state) => format!("{text}, {state}"),
                None => text.to_string(),
            };
            return Self {
                zip: Some(text.to_string()),
                state: state.map(str::to_string),
                ..Self::new(SearchType::Zip, title)
            };
        }

        Self {
            city: Some(text.to_string()),
            ..Self::new(SearchType::City, text)
        }
    }

    /// Builds a location from one autocomplete match.
    ///
    /// The state comes from an explicit field when present, else from a
    /// `"…, XX"` title.
    pub fn from_autocomplete(entry: &Value, query: &str) -> Self {
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| entry.get(*k).and_then(Value::as_str))
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let title = text(&["title", "display_name"]).unwrap_or_else(|| query.to_string());
        let search_type = text(&["searchType", "type"])
            .map_or(SearchType::City, |code| SearchType::from_code(&code));

        let mut location = Self::new(search_type, title);
        location.state = text(&["state", "state_code"]).or_else(|| {
            location
                .title
                .rsplit_once(',')
                .map(|(_, state)| state.trim().to_string())
                .filter(|s| !s.is_empty())
        });

        match search_type {
            SearchType::County => location.county = text(&["county"]),
            SearchType::City => location.city = text(&["city"]),
            SearchType::Zip => location.zip = text(&["zip", "zip_code"]),
        }
        location
    }
}

fn strip_county(place: &str) -> Option<String> {
    let lower = place.to_ascii_lowercase();
    let at = lower.find("county")?;
    let name = format!("{}{}", &place[..at], &place[at + "county".len()..]);
    Some(name.trim().to_string())
}

fn zip_state(zip: &str) -> Option<&'static str> {
    ZIP_STATES
        .iter()
        .find(|(z, _)| *z == zip)
        .map(|(_, state)| *state)
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolves free text through the autocomplete API, falling back to
/// [`Location::parse`].
#[instrument(skip(session, descriptor))]
pub async fn resolve_location(
    session: &SessionManager,
    descriptor: &CatalogDescriptor,
    query: &str,
) -> Location {
    let request = OutboundRequest::post(descriptor.autocomplete.clone())
        .kind(RequestKind::Api)
        .referer(descriptor.search_page.as_str())
        .header(reqwest::header::ORIGIN, &descriptor.origin)
        .json(json!({ "query": query }));

    match session.call_json::<Value>(request).await {
        Ok(body) => match first_autocomplete_match(&body) {
            Some(entry) => {
                let location = Location::from_autocomplete(entry, query);
                debug!(title = %location.title, "Location resolved by autocomplete");
                location
            }
            None => {
                debug!("Autocomplete returned no matches, parsing locally");
                Location::parse(query)
            }
        },
        Err(e) => {
            debug!(error = %e, "Autocomplete failed, parsing locally");
            Location::parse(query)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_city() {
        let location = Location::parse(" Dallas, TX ");
        assert_eq!(location.search_type, SearchType::City);
        assert_eq!(location.city.as_deref(), Some("Dallas"));
        assert_eq!(location.state.as_deref(), Some("TX"));
        assert_eq!(location.title, "Dallas, TX");
    }

    #[test]
    fn test_parse_county() {
        let location = Location::parse("Dallas County, TX");
        assert_eq!(location.search_type, SearchType::County);
        assert_eq!(location.county.as_deref(), Some("Dallas"));
        assert_eq!(location.state.as_deref(), Some("TX"));
    }

    #[test]
    fn test_parse_zip() {
        let known = Location::parse("46201");
        assert_eq!(known.search_type, SearchType::Zip);
        assert_eq!(known.state.as_deref(), Some("IN"));
        assert_eq!(known.title, "46201, IN");

        let unknown = Location::parse("99999");
        assert_eq!(unknown.zip.as_deref(), Some("99999"));
        assert_eq!(unknown.state, None);
        assert_eq!(unknown.title, "99999");
    }

    #[test]
    fn test_parse_bare_text_is_city() {
        let location = Location::parse("Springfield");
        assert_eq!(location.search_type, SearchType::City);
        assert_eq!(location.city.as_deref(), Some("Springfield"));
        assert_eq!(location.state, None);

        // Not five digits.
        assert_eq!(Location::parse("1234").search_type, SearchType::City);
    }

    #[test]
    fn test_serializes_api_shape() {
        let value = serde_json::to_value(Location::parse("Dallas County, TX")).unwrap();
        assert_eq!(
            value,
            json!({"searchType": "N", "title": "Dallas County, TX", "state": "TX", "county": "Dallas"})
        );
    }

    #[test]
    fn test_from_autocomplete_takes_state_from_title() {
        let entry = json!({"searchType": "Z", "title": "46201, IN", "zip_code": "46201"});
        let location = Location::from_autocomplete(&entry, "46201");
        assert_eq!(location.search_type, SearchType::Zip);
        assert_eq!(location.state.as_deref(), Some("IN"));
        assert_eq!(location.zip.as_deref(), Some("46201"));
    }

    #[test]
    fn test_from_autocomplete_prefers_explicit_state() {
        let entry = json!({"type": "N", "display_name": "Cook County, Illinois", "state": "IL", "county": "Cook"});
        let location = Location::from_autocomplete(&entry, "cook");
        assert_eq!(location.search_type, SearchType::County);
        assert_eq!(location.title, "Cook County, Illinois");
        assert_eq!(location.state.as_deref(), Some("IL"));
        assert_eq!(location.county.as_deref(), Some("Cook"));
    }

    #[test]
    fn test_from_autocomplete_defaults() {
        let location = Location::from_autocomplete(&json!({}), "Austin");
        assert_eq!(location.search_type, SearchType::City);
        assert_eq!(location.title, "Austin");
        assert_eq!(location.state, None);
    }
}
