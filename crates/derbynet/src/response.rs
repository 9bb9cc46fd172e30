//! Inbound document decoding
//!
//! The server answers every request with an `action-response` document. Its
//! top-level children are decoded into `ResponseElement`s in document order.

use std::collections::HashMap;

use contracts::{HeatDescriptor, LaneMask};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{DerbyNetError, Result};

const ROOT: &str = "action-response";

/// One top-level element of an action response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseElement {
    HeatReady(HeatDescriptor),
    RemoteLog { send: bool },
    Query,
    Failure { code: String, message: String },
    Success,
    Abort,
    RemoteStart,
    AssignFlag,
    AssignPort,
    AssignDevice,
    Other(String),
}

/// Decoded action response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionResponse {
    pub elements: Vec<ResponseElement>,
}

impl ActionResponse {
    /// Decode a reply body.
    ///
    /// # Errors
    /// `Parse` if the body is not well formed or the root is not `action-response`
    pub fn parse(body: &str) -> Result<Self> {
        let mut reader = Reader::from_str(body);
        reader.config_mut().trim_text(true);

        let mut elements = Vec::new();
        let mut depth = 0usize;
        let mut root_seen = false;
        // Open top-level failure element: (code, text so far)
        let mut failure: Option<(String, String)> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| DerbyNetError::parse(e.to_string()))?;
            match event {
                Event::Start(start) => {
                    if depth == 0 {
                        check_root(&start, &mut root_seen)?;
                    } else if depth == 1 {
                        let name = element_name(&start);
                        if name == "failure" {
                            let code = attributes(&start)?.remove("code").unwrap_or_default();
                            failure = Some((code, String::new()));
                        } else {
                            elements.push(decode_element(&name, &start)?);
                        }
                    }
                    depth += 1;
                }
                Event::Empty(start) => {
                    if depth == 0 {
                        // `<action-response/>` carries nothing
                        check_root(&start, &mut root_seen)?;
                    } else if depth == 1 {
                        let name = element_name(&start);
                        elements.push(decode_element(&name, &start)?);
                    }
                }
                Event::Text(text) => {
                    if let Some((_, message)) = failure.as_mut() {
                        message.push_str(&decode_text(&text)?);
                    }
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if depth == 1 {
                        if let Some((code, message)) = failure.take() {
                            elements.push(ResponseElement::Failure { code, message });
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !root_seen {
            return Err(DerbyNetError::parse(format!("missing <{ROOT}> root")));
        }
        if depth != 0 {
            return Err(DerbyNetError::parse("unexpected end of document"));
        }
        Ok(Self { elements })
    }

    /// Heat announcement, if present
    pub fn heat_ready(&self) -> Option<&HeatDescriptor> {
        self.elements.iter().find_map(|e| match e {
            ResponseElement::HeatReady(heat) => Some(heat),
            _ => None,
        })
    }

    /// Server failures in document order
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.elements.iter().filter_map(|e| match e {
            ResponseElement::Failure { code, message } => Some((code.as_str(), message.as_str())),
            _ => None,
        })
    }
}

/// Byte count accepted by the log endpoint.
///
/// The reply looks like `<success>123 bytes</success>`; anything else
/// returns `None`.
pub fn parse_log_reply(body: &str) -> Option<usize> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut in_success = false;
    loop {
        match reader.read_event().ok()? {
            Event::Start(start) if start.name().as_ref() == b"success" => in_success = true,
            Event::Text(text) if in_success => {
                let text = decode_text(&text).ok()?;
                let count = text.split_whitespace().next()?;
                return count.parse().ok();
            }
            Event::End(end) if end.name().as_ref() == b"success" => return None,
            Event::Eof => return None,
            _ => {}
        }
    }
}

fn check_root(start: &BytesStart<'_>, root_seen: &mut bool) -> Result<()> {
    let name = element_name(start);
    if name != ROOT || *root_seen {
        return Err(DerbyNetError::parse(format!(
            "unexpected root element <{name}>"
        )));
    }
    *root_seen = true;
    Ok(())
}

fn decode_element(name: &str, start: &BytesStart<'_>) -> Result<ResponseElement> {
    let element = match name {
        "heat-ready" => {
            let attrs = attributes(start)?;
            ResponseElement::HeatReady(HeatDescriptor {
                lane_mask: LaneMask(number(&attrs, "lane-mask")?),
                class_name: attrs.get("class").cloned().unwrap_or_default(),
                round_ordinal: number(&attrs, "round")?,
                round_id: number(&attrs, "roundid")?,
                heat_number: number(&attrs, "heat")?,
            })
        }
        "remote-log" => {
            let attrs = attributes(start)?;
            let send = matches!(
                attrs.get("send").map(|v| v.trim().to_ascii_lowercase()).as_deref(),
                Some("true" | "1" | "yes")
            );
            ResponseElement::RemoteLog { send }
        }
        "query" => ResponseElement::Query,
        "failure" => ResponseElement::Failure {
            code: attributes(start)?.remove("code").unwrap_or_default(),
            message: String::new(),
        },
        "success" => ResponseElement::Success,
        "abort" => ResponseElement::Abort,
        "remote-start" => ResponseElement::RemoteStart,
        "assign-flag" => ResponseElement::AssignFlag,
        "assign-port" => ResponseElement::AssignPort,
        "assign-device" => ResponseElement::AssignDevice,
        other => ResponseElement::Other(other.to_string()),
    };
    Ok(element)
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn attributes(start: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| DerbyNetError::parse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| DerbyNetError::parse(e.to_string()))?
            .into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

/// Missing numeric attributes read as 0
fn number(attrs: &HashMap<String, String>, key: &str) -> Result<u32> {
    match attrs.get(key).map(|v| v.trim()) {
        None | Some("") => Ok(0),
        Some(value) => value
            .parse()
            .map_err(|_| DerbyNetError::parse(format!("attribute {key}='{value}' is not a number"))),
    }
}

fn decode_text(raw: &[u8]) -> Result<String> {
    let text = String::from_utf8_lossy(raw);
    unescape(&text)
        .map(|t| t.into_owned())
        .map_err(|e| DerbyNetError::parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heat_ready() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<action-response action="timer-message">
  <success/>
  <heat-ready lane-mask="14" class="Tigers" round="2" roundid="7" heat="4"/>
</action-response>"#;
        let response = ActionResponse::parse(body).unwrap();
        assert_eq!(response.elements[0], ResponseElement::Success);
        let heat = response.heat_ready().unwrap();
        assert_eq!(heat.lane_mask, LaneMask(14));
        assert_eq!(heat.class_name, "Tigers");
        assert_eq!(heat.round_ordinal, 2);
        assert_eq!(heat.round_id, 7);
        assert_eq!(heat.heat_number, 4);
    }

    #[test]
    fn test_every_element_kind() {
        let body = r#"<action-response>
  <remote-log send="true"/>
  <query/>
  <abort/>
  <remote-start/>
  <assign-flag/>
  <assign-port/>
  <assign-device/>
  <mystery/>
</action-response>"#;
        let response = ActionResponse::parse(body).unwrap();
        assert_eq!(
            response.elements,
            vec![
                ResponseElement::RemoteLog { send: true },
                ResponseElement::Query,
                ResponseElement::Abort,
                ResponseElement::RemoteStart,
                ResponseElement::AssignFlag,
                ResponseElement::AssignPort,
                ResponseElement::AssignDevice,
                ResponseElement::Other("mystery".to_string()),
            ]
        );
    }

    #[test]
    fn test_repeated_failures_keep_text() {
        let body = r#"<action-response>
  <failure code="notauthorized">Not authorized &amp; logged</failure>
  <failure code="nosuchheat">No such heat</failure>
</action-response>"#;
        let response = ActionResponse::parse(body).unwrap();
        let failures: Vec<_> = response.failures().collect();
        assert_eq!(
            failures,
            vec![
                ("notauthorized", "Not authorized & logged"),
                ("nosuchheat", "No such heat"),
            ]
        );
    }

    #[test]
    fn test_nested_elements_not_top_level() {
        let body = r#"<action-response><outer><abort/></outer></action-response>"#;
        let response = ActionResponse::parse(body).unwrap();
        assert_eq!(response.elements, vec![ResponseElement::Other("outer".into())]);
    }

    #[test]
    fn test_empty_root() {
        let response = ActionResponse::parse("<action-response/>").unwrap();
        assert!(response.elements.is_empty());
    }

    #[test]
    fn test_remote_log_off() {
        let response =
            ActionResponse::parse(r#"<action-response><remote-log send="false"/></action-response>"#)
                .unwrap();
        assert_eq!(response.elements, vec![ResponseElement::RemoteLog { send: false }]);
    }

    #[test]
    fn test_malformed_documents() {
        assert!(ActionResponse::parse("").is_err());
        assert!(ActionResponse::parse("<html><body>500</body></html>").is_err());
        assert!(ActionResponse::parse("<action-response><query>").is_err());
        assert!(ActionResponse::parse(
            r#"<action-response><heat-ready heat="four"/></action-response>"#
        )
        .is_err());
    }

    #[test]
    fn test_log_reply() {
        assert_eq!(parse_log_reply("<success>42 bytes</success>"), Some(42));
        assert_eq!(parse_log_reply("<success> 7 bytes </success>"), Some(7));
        assert_eq!(parse_log_reply("<failure>nope</failure>"), None);
        assert_eq!(parse_log_reply("<success>lots</success>"), None);
        assert_eq!(parse_log_reply("not xml at all"), None);
    }
}
