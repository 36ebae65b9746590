///! Air365 IoT data XML parser
///!
///! The endpoint answers with a flat document, e.g.
///! `<data><pm25>12</pm25><pm10>30</pm10><temp>21.5</temp><humi>40</humi></data>`.
///! Every child of the root element becomes one reading.

use chrono::{DateTime, Local};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use super::types::{Readings, LAST_UPDATE_TIME_FIELD};
use crate::error::FetchError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn element_name(station_no: &str, raw: &[u8]) -> Result<String, FetchError> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| parse_error(station_no, format!("element name is not UTF-8: {}", e)))
}

fn parse_error(station_no: &str, message: impl Into<String>) -> FetchError {
    FetchError::Parse {
        station_no: station_no.to_string(),
        message: message.into(),
    }
}

/// Parse the response body for `station_no` into a [`Readings`] map.
///
/// Unknown tags are kept. Text is kept verbatim (entities are unescaped, nothing
/// is trimmed or converted). `last_update_time` is set to `fetched_at`.
pub fn parse_station_xml(
    station_no: &str,
    body: &str,
    fetched_at: DateTime<Local>,
) -> Result<Readings, FetchError> {
    let mut reader = Reader::from_str(body);
    let mut readings = Readings::new();

    // depth 1 = inside root, depth 2 = inside a reading element
    let mut depth = 0usize;
    let mut root_seen = false;
    let mut current: Option<(String, String)> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            parse_error(
                station_no,
                format!("invalid XML at byte {}: {}", reader.buffer_position(), e),
            )
        })?;

        match event {
            Event::Start(e) => {
                if depth == 0 {
                    if root_seen {
                        return Err(parse_error(station_no, "more than one root element"));
                    }
                    root_seen = true;
                } else if depth == 1 {
                    current = Some((element_name(station_no, e.name().as_ref())?, String::new()));
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 0 {
                    if root_seen {
                        return Err(parse_error(station_no, "more than one root element"));
                    }
                    root_seen = true;
                } else if depth == 1 {
                    readings.insert(element_name(station_no, e.name().as_ref())?, String::new());
                }
            }
            Event::End(_) => {
                if depth == 2 {
                    if let Some((tag, value)) = current.take() {
                        readings.insert(tag, value);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| parse_error(station_no, format!("bad text content: {}", e)))?;
                if depth == 0 && !text.trim().is_empty() {
                    return Err(parse_error(station_no, "text outside of the root element"));
                }
                if depth == 2 {
                    if let Some((_, value)) = current.as_mut() {
                        value.push_str(&text);
                    }
                }
            }
            Event::CData(c) => {
                if depth == 2 {
                    if let Some((_, value)) = current.as_mut() {
                        value.push_str(&String::from_utf8_lossy(&c));
                    }
                }
            }
            Event::Eof => break,
            // declarations, comments, processing instructions, doctype
            _ => {}
        }
    }

    if !root_seen {
        return Err(parse_error(station_no, "response has no root element"));
    }
    if depth != 0 {
        return Err(parse_error(station_no, "document ended before the root element was closed"));
    }

    readings.insert(
        LAST_UPDATE_TIME_FIELD.to_string(),
        fetched_at.format(TIMESTAMP_FORMAT).to_string(),
    );

    Ok(readings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fetched_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 1, 10, 5, 0).unwrap()
    }

    #[test]
    fn test_parse_flat_document() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<data>
    <pm25>12</pm25>
    <pm10>30</pm10>
    <temp>21.5</temp>
    <humi>40.2</humi>
</data>"#;
        let readings = parse_station_xml("S1", xml, fetched_at()).unwrap();

        assert_eq!(readings.len(), 5);
        assert_eq!(readings["pm25"], "12");
        assert_eq!(readings["pm10"], "30");
        assert_eq!(readings["temp"], "21.5");
        assert_eq!(readings["humi"], "40.2");
        assert_eq!(readings[LAST_UPDATE_TIME_FIELD], "2026-03-01 10:05:00");
    }

    #[test]
    fn test_unknown_tags_and_verbatim_values() {
        let xml = "<r><pm25>012</pm25><co2> 415 </co2><status>ok &amp; live</status><note/></r>";
        let readings = parse_station_xml("S1", xml, fetched_at()).unwrap();

        assert_eq!(readings.len(), 4 + 1);
        assert_eq!(readings["pm25"], "012");
        assert_eq!(readings["co2"], " 415 ");
        assert_eq!(readings["status"], "ok & live");
        assert_eq!(readings["note"], "");
    }

    #[test]
    fn test_upstream_timestamp_is_replaced() {
        let xml = "<r><last_update_time>yesterday</last_update_time></r>";
        let readings = parse_station_xml("S1", xml, fetched_at()).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[LAST_UPDATE_TIME_FIELD], "2026-03-01 10:05:00");
    }

    #[test]
    fn test_nested_elements_do_not_leak() {
        let xml = "<r><pm25>12<unit>ug</unit></pm25><pm10>30</pm10></r>";
        let readings = parse_station_xml("S1", xml, fetched_at()).unwrap();
        assert_eq!(readings["pm25"], "12");
        assert!(!readings.contains_key("unit"));
        assert_eq!(readings.len(), 3);
    }

    #[test]
    fn test_empty_root_yields_only_timestamp() {
        let readings = parse_station_xml("S1", "<data/>", fetched_at()).unwrap();
        assert_eq!(readings.len(), 1);
        assert!(readings.contains_key(LAST_UPDATE_TIME_FIELD));
    }

    #[test]
    fn test_malformed_bodies_are_rejected() {
        let bodies = [
            "",
            "Service Unavailable",
            "<data><pm25>12</pm10></data>",
            "<data><pm25>12</pm25>",
            "<a/><b/>",
        ];
        for body in bodies {
            let err = parse_station_xml("S1", body, fetched_at()).unwrap_err();
            assert!(
                matches!(err, FetchError::Parse { ref station_no, .. } if station_no == "S1"),
                "body {:?} gave {:?}",
                body,
                err
            );
        }
    }
}
