//! `{{name}}` substitution in a raw query body, run before JSON parsing so
//! a variable can stand in for any token position (a date literal, a
//! field name, a whole filter fragment). `name` is first tried as a date
//! expression in its own right — `now`, `today`, or a parseable timestamp
//! — and resolves to its Unix timestamp; failing that it's looked up in
//! the request's query-string parameters, falling back to the literal
//! `{{name}}` text if unmatched (mirrors the original leaving unresolved
//! placeholders visible rather than failing the request).

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

pub fn interpolate(body: &str, params: &HashMap<String, String>, now_unix: i64) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match parse_date_unix(name, now_unix) {
                    Some(unix) => out.push_str(&unix.to_string()),
                    None => match params.get(name) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&format!("{{{{{}}}}}", name)),
                    },
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// `now`/`today` are the two date expressions that can't be parsed from
/// their own text, so they're special-cased to the request's clock;
/// everything else goes through a handful of common date/time formats
/// before giving up and letting the caller fall back to a named param.
fn parse_date_unix(name: &str, now_unix: i64) -> Option<i64> {
    if name == "now" || name == "today" {
        return Some(now_unix);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(name) {
        return Some(dt.timestamp());
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(name, "%Y-%m-%d %H:%M:%S") {
        return Some(ndt.timestamp());
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(name, "%Y-%m-%dT%H:%M:%S") {
        return Some(ndt.timestamp());
    }
    if let Ok(d) = NaiveDate::parse_from_str(name, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.timestamp());
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn now_resolves_to_unix_timestamp() {
        let params = HashMap::new();
        assert_eq!(interpolate("{\"at\": {{now}}}", &params, 1234), "{\"at\": 1234}");
    }

    #[test]
    fn named_param_is_substituted() {
        let mut params = HashMap::new();
        params.insert("region".to_string(), "us-east".to_string());
        assert_eq!(interpolate("{\"region\": \"{{region}}\"}", &params, 0), "{\"region\": \"us-east\"}");
    }

    #[test]
    fn date_literal_resolves_to_its_own_timestamp_ahead_of_any_param() {
        let mut params = HashMap::new();
        params.insert("2024-01-01".to_string(), "should not be used".to_string());
        assert_eq!(interpolate("{{2024-01-01}}", &params, 0), "1704067200");
    }

    #[test]
    fn rfc3339_literal_resolves_to_its_own_timestamp() {
        let params = HashMap::new();
        assert_eq!(interpolate("{{2024-01-01T00:00:00Z}}", &params, 0), "1704067200");
    }

    #[test]
    fn non_date_name_falls_back_to_param_lookup() {
        let mut params = HashMap::new();
        params.insert("region".to_string(), "us-east".to_string());
        assert_eq!(interpolate("{{region}}", &params, 0), "us-east");
    }

    #[test]
    fn unmatched_placeholder_is_left_untouched() {
        let params = HashMap::new();
        assert_eq!(interpolate("{{missing}}", &params, 0), "{{missing}}");
    }
}
