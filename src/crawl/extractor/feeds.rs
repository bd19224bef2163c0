//! Feed link extraction from XML response bodies
//!
//! Pages served as Atom or RSS carry their outbound links in the XML rather
//! than in anchors. Both parsers walk the event stream and resolve link
//! targets against the page's canonical URL.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use url::Url;

/// The Atom namespace a feed document must declare.
const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Entry links of an Atom document: `/feed/entry/link[@rel='alternate']`.
///
/// The root element must be `feed` in the Atom namespace; anything else
/// yields no links. `href` values resolve against `base`.
pub fn atom_entry_links(xml: &str, base: &Url) -> Result<Vec<Url>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut atom_root = false;
    let mut links = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                let local = local_name(&element);
                if path.is_empty() {
                    atom_root = local == "feed" && declares_atom_namespace(&element);
                }
                if atom_root && is_entry_link(&path, &local) {
                    push_alternate_link(&element, base, &mut links)?;
                }
                path.push(local);
            }
            Event::Empty(element) => {
                let local = local_name(&element);
                if atom_root && is_entry_link(&path, &local) {
                    push_alternate_link(&element, base, &mut links)?;
                }
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(links)
}

/// Item links of an RSS document: `/rss/channel/item/link` element text.
pub fn rss_item_links(xml: &str, base: &Url) -> Result<Vec<Url>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut in_item_link = false;
    let mut links = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                let local = local_name(&element);
                in_item_link = path.len() == 3
                    && path[0] == "rss"
                    && path[1] == "channel"
                    && path[2] == "item"
                    && local == "link";
                path.push(local);
            }
            Event::End(_) => {
                path.pop();
                in_item_link = false;
            }
            Event::Text(text) if in_item_link => {
                let target = text.unescape()?;
                if let Ok(url) = base.join(target.trim()) {
                    links.push(url);
                }
            }
            Event::CData(text) if in_item_link => {
                let target = String::from_utf8_lossy(&text.into_inner()).to_string();
                if let Ok(url) = base.join(target.trim()) {
                    links.push(url);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(links)
}

/// Local element name, dropping any namespace prefix.
fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.name().local_name().as_ref()).to_string()
}

/// Is the current element a `link` directly under `/feed/entry`?
fn is_entry_link(path: &[String], local: &str) -> bool {
    path.len() == 2 && path[0] == "feed" && path[1] == "entry" && local == "link"
}

/// Does the element declare the Atom namespace, default or prefixed?
fn declares_atom_namespace(element: &BytesStart<'_>) -> bool {
    element.attributes().flatten().any(|attr| {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        (key == "xmlns" || key.starts_with("xmlns:"))
            && attr.value.as_ref() == ATOM_NS.as_bytes()
    })
}

/// Append the link's resolved href when its `rel` is `alternate`.
fn push_alternate_link(
    element: &BytesStart<'_>,
    base: &Url,
    links: &mut Vec<Url>,
) -> Result<(), quick_xml::Error> {
    let mut rel = None;
    let mut href = None;
    for attr in element.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"rel" => rel = Some(attr.unescape_value()?.to_string()),
            b"href" => href = Some(attr.unescape_value()?.to_string()),
            _ => {}
        }
    }

    if rel.as_deref() == Some("alternate") {
        if let Some(href) = href {
            if let Ok(url) = base.join(&href) {
                links.push(url);
            }
        }
    }
    Ok(())
}
