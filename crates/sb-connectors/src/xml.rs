//! Structured lookups in Splunk REST XML bodies.
//!
//! Splunk answers login, job creation and job status calls with XML. Job
//! status is an Atom entry whose properties live in an `s:dict` of
//! `s:key name="..."` elements in the Splunk REST namespace.

use crate::traits::{ConnectorError, ConnectorResult};
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;

/// Splunk REST namespace URI.
pub const SPLUNK_REST_NS: &[u8] = b"http://dev.splunk.com/ns/rest";

fn parse_error(e: impl std::fmt::Display) -> ConnectorError {
    ConnectorError::Parse(format!("malformed XML: {}", e))
}

fn in_splunk_ns_or_unqualified(ns: &ResolveResult<'_>) -> bool {
    match ns {
        ResolveResult::Unbound => true,
        ResolveResult::Bound(Namespace(uri)) => *uri == SPLUNK_REST_NS,
        ResolveResult::Unknown(_) => false,
    }
}

/// Returns the text of the first element named `local` that is either
/// unqualified or in the Splunk REST namespace.
///
/// The whole document is read, so any well-formedness error is reported
/// even when it comes after the match.
pub fn element_text(body: &str, local: &str) -> ConnectorResult<Option<String>> {
    let mut reader = NsReader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut found: Option<String> = None;
    let mut capturing = false;

    loop {
        match reader.read_resolved_event().map_err(parse_error)? {
            (ns, Event::Start(e)) => {
                if found.is_none()
                    && e.local_name().as_ref() == local.as_bytes()
                    && in_splunk_ns_or_unqualified(&ns)
                {
                    capturing = true;
                    found = Some(String::new());
                }
            }
            (_, Event::Text(t)) if capturing => {
                let text = t.unescape().map_err(parse_error)?;
                if let Some(value) = found.as_mut() {
                    value.push_str(&text);
                }
            }
            (_, Event::CData(c)) if capturing => {
                if let Some(value) = found.as_mut() {
                    value.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            (_, Event::End(_)) => capturing = false,
            (_, Event::Eof) => break,
            _ => {}
        }
    }

    Ok(found.filter(|v| !v.is_empty()))
}

/// Returns the text of `entry/content/s:dict/s:key[@name=key]` in an Atom
/// document.
///
/// Only keys of the top-level dict are considered; nested dicts with a key
/// of the same name are skipped.
pub fn atom_content_key(body: &str, key: &str) -> ConnectorResult<Option<String>> {
    let mut reader = NsReader::from_str(body);
    reader.config_mut().trim_text(true);

    // Element names from the root down to the current element.
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut found: Option<String> = None;
    let mut capture_depth: Option<usize> = None;

    loop {
        match reader.read_resolved_event().map_err(parse_error)? {
            (ns, Event::Start(e)) => {
                let local = e.local_name().as_ref().to_vec();
                let is_top_level_key = found.is_none()
                    && local == b"key"
                    && matches!(ns, ResolveResult::Bound(Namespace(uri)) if uri == SPLUNK_REST_NS)
                    && path.len() >= 3
                    && path[path.len() - 1] == b"dict"
                    && path[path.len() - 2] == b"content"
                    && path[path.len() - 3] == b"entry";

                if is_top_level_key {
                    let name = e.try_get_attribute("name").map_err(parse_error)?;
                    if let Some(attr) = name {
                        if attr.unescape_value().map_err(parse_error)? == key {
                            found = Some(String::new());
                            capture_depth = Some(path.len() + 1);
                        }
                    }
                }
                path.push(local);
            }
            (_, Event::Text(t)) => {
                if capture_depth == Some(path.len()) {
                    let text = t.unescape().map_err(parse_error)?;
                    if let Some(value) = found.as_mut() {
                        value.push_str(&text);
                    }
                }
            }
            (_, Event::End(_)) => {
                if capture_depth == Some(path.len()) {
                    capture_depth = None;
                }
                path.pop();
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }

    Ok(found)
}

/// Returns the contents of the first literal `<tag>...</tag>` pair.
///
/// Last resort for bodies that are not well-formed XML.
pub fn literal_tag_text(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = body.find(&open)? + open.len();
    let len = body[start..].find(&close)?;
    let value = body[start..start + len].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB_STATUS_DONE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<entry xmlns="http://www.w3.org/2005/Atom" xmlns:s="http://dev.splunk.com/ns/rest">
  <title>search index=main</title>
  <id>https://localhost:8089/services/search/jobs/job-123</id>
  <content type="text/xml">
    <s:dict>
      <s:key name="isDone">1</s:key>
      <s:key name="request">
        <s:dict>
          <s:key name="dispatchState">BOGUS</s:key>
        </s:dict>
      </s:key>
      <s:key name="dispatchState">DONE</s:key>
    </s:dict>
  </content>
</entry>"#;

    #[test]
    fn test_atom_content_key_reads_top_level_key() {
        assert_eq!(
            atom_content_key(JOB_STATUS_DONE, "dispatchState").unwrap(),
            Some("DONE".to_string())
        );
        assert_eq!(
            atom_content_key(JOB_STATUS_DONE, "isDone").unwrap(),
            Some("1".to_string())
        );
        assert_eq!(atom_content_key(JOB_STATUS_DONE, "missing").unwrap(), None);
    }

    #[test]
    fn test_atom_content_key_rejects_malformed() {
        let body = "<entry><content><s:dict></content>";
        assert!(matches!(
            atom_content_key(body, "dispatchState"),
            Err(ConnectorError::Parse(_))
        ));
    }

    #[test]
    fn test_element_text_unqualified_and_namespaced() {
        assert_eq!(
            element_text("<response><sessionKey>abc123</sessionKey></response>", "sessionKey")
                .unwrap(),
            Some("abc123".to_string())
        );
        let namespaced = r#"<response xmlns:s="http://dev.splunk.com/ns/rest"><s:sid>job-9</s:sid></response>"#;
        assert_eq!(
            element_text(namespaced, "sid").unwrap(),
            Some("job-9".to_string())
        );
    }

    #[test]
    fn test_element_text_ignores_foreign_namespace() {
        let body = r#"<response xmlns:x="urn:other"><x:sid>nope</x:sid></response>"#;
        assert_eq!(element_text(body, "sid").unwrap(), None);
    }

    #[test]
    fn test_element_text_unescapes() {
        assert_eq!(
            element_text("<r><sid>a&amp;b</sid></r>", "sid").unwrap(),
            Some("a&b".to_string())
        );
    }

    #[test]
    fn test_element_text_reports_late_errors() {
        let body = "<response><sid>job-9</sid></oops>";
        assert!(element_text(body, "sid").is_err());
    }

    #[test]
    fn test_literal_tag_text() {
        assert_eq!(
            literal_tag_text("junk <sid> job-9 </sid> more", "sid"),
            Some("job-9".to_string())
        );
        assert_eq!(literal_tag_text("<sid></sid>", "sid"), None);
        assert_eq!(literal_tag_text("no tags", "sid"), None);
    }
}
