//! DOM preparation for part documents: parsing, normalisation, sanitising and chrome injection.
//!
//! Every document handed to a [`LayoutEngine`](crate::layout::LayoutEngine) goes through these
//! steps so that engines only ever see a complete `html > head + body` tree.

use html5ever::{LocalName, Namespace, QualName};
use kuchiki::traits::TendrilSink;
use kuchiki::NodeRef;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Parses a complete document or a body fragment.
///
/// Fragments are parsed in a `body` context and come back without `head`/`body` elements; run
/// [`normalize`] afterwards.
pub fn parse(html: &str) -> NodeRef {
    if html.to_ascii_lowercase().contains("<html") {
        kuchiki::parse_html().one(html)
    } else {
        kuchiki::parse_fragment(qualified_name("body"), Vec::new()).one(html)
    }
}

/// Makes sure the document has `html`, `head` and `body`, moving loose content into the body.
pub fn normalize(document: &NodeRef) {
    if document.select_first("body").is_ok() {
        return;
    }

    let root = document
        .select_first("html")
        .ok()
        .map(|html| html.as_node().clone());
    let container = root.clone().unwrap_or_else(|| document.clone());
    let loose: Vec<NodeRef> = container.children().collect();

    let html = root.unwrap_or_else(|| {
        let html = create_element("html");
        document.append(html.clone());
        html
    });
    let head = create_element("head");
    let body = create_element("body");
    for node in loose {
        node.detach();
        body.append(node);
    }
    html.append(head);
    html.append(body);
}

/// Rewrites constructs that would otherwise split badly across pages.
pub fn sanitize(document: &NodeRef) {
    for message in select_all(document, "ul > li > div.msg") {
        hoist_message(&message);
    }

    for message in select_all(document, ".msg") {
        unbreakable_wrap(&message);
    }

    for pre in select_all(document, "pre") {
        trim_edges(&pre);
        let wrapper = wrap(&pre, "div", true, &["pre"]);
        unbreakable_wrap(&wrapper);
    }

    for code in select_all(document, "code") {
        wrap(&code, "span", false, &["code"]);
    }

    for heading in select_all(document, "h1, h2, h3, h4, h5, h6") {
        set_attribute(&heading, "data-pdf-bookmark", "exclude");
    }

    for image in select_all(document, "img:not(.inline)") {
        add_class(&image, "docetimage");
        image.insert_before(create_element("br"));
        image.insert_after(create_element("br"));
        wrap(&image, "div", true, &[]);
    }
}

/// Appends `head_fragment` to `head` and prepends `body_fragment` to `body`.
pub fn inject(document: &NodeRef, head_fragment: &str, body_fragment: Option<&str>) {
    if let Ok(head) = document.select_first("head") {
        for node in fragment_nodes(head_fragment) {
            head.as_node().append(node);
        }
    }

    if let (Some(fragment), Ok(body)) = (body_fragment, document.select_first("body")) {
        for node in fragment_nodes(fragment).into_iter().rev() {
            body.as_node().prepend(node);
        }
    }
}

/// Inserts `<a name="{name}">` right before `#main`, or as the first body child without one.
pub fn insert_anchor(document: &NodeRef, name: &str) {
    let anchor = create_element("a");
    set_attribute(&anchor, "name", name);

    if let Ok(main) = document.select_first("#main") {
        main.as_node().insert_before(anchor);
    } else if let Ok(body) = document.select_first("body") {
        body.as_node().prepend(anchor);
    }
}

fn hoist_message(message: &NodeRef) {
    let Some(item) = message.parent() else {
        return;
    };
    let Some(list) = item.parent() else {
        return;
    };

    message.detach();
    item.detach();

    let hoisted = create_element("ul");
    hoisted.append(item);
    list.insert_before(hoisted.clone());
    hoisted.insert_after(message.clone());
}

fn unbreakable_wrap(node: &NodeRef) -> NodeRef {
    let inner = wrap(node, "div", false, &["avoid-break", "wide"]);
    wrap(&inner, "div", false, &["wide"])
}

fn wrap(node: &NodeRef, tag: &str, copy_classes: bool, classes: &[&str]) -> NodeRef {
    let wrapper = create_element(tag);
    if copy_classes {
        for class in class_list(node) {
            add_class(&wrapper, &class);
        }
    }
    for class in classes {
        add_class(&wrapper, class);
    }

    node.insert_before(wrapper.clone());
    node.detach();
    wrapper.append(node.clone());
    wrapper
}

fn trim_edges(node: &NodeRef) {
    if let Some(first) = node.first_child() {
        if let Some(text) = first.as_text() {
            let trimmed = text.borrow().trim_start().to_string();
            *text.borrow_mut() = trimmed;
        }
    }
    if let Some(last) = node.last_child() {
        if let Some(text) = last.as_text() {
            let trimmed = text.borrow().trim_end().to_string();
            *text.borrow_mut() = trimmed;
        }
    }
}

fn fragment_nodes(fragment: &str) -> Vec<NodeRef> {
    let parsed = parse(fragment);
    let container = parsed
        .select_first("body")
        .or_else(|_| parsed.select_first("html"))
        .map(|node| node.as_node().clone())
        .unwrap_or(parsed);

    let nodes: Vec<NodeRef> = container.children().collect();
    for node in &nodes {
        node.detach();
    }
    nodes
}

fn select_all(document: &NodeRef, selector: &str) -> Vec<NodeRef> {
    document
        .select(selector)
        .map(|matches| matches.map(|element| element.as_node().clone()).collect())
        .unwrap_or_default()
}

fn qualified_name(tag: &str) -> QualName {
    QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag))
}

pub(crate) fn create_element(tag: &str) -> NodeRef {
    NodeRef::new_element(
        qualified_name(tag),
        Vec::<(kuchiki::ExpandedName, kuchiki::Attribute)>::new(),
    )
}

pub(crate) fn attribute(node: &NodeRef, name: &str) -> Option<String> {
    node.as_element()
        .and_then(|element| element.attributes.borrow().get(name).map(str::to_string))
}

pub(crate) fn set_attribute(node: &NodeRef, name: &str, value: &str) {
    if let Some(element) = node.as_element() {
        element
            .attributes
            .borrow_mut()
            .insert(name, value.to_string());
    }
}

pub(crate) fn class_list(node: &NodeRef) -> Vec<String> {
    attribute(node, "class")
        .map(|classes| classes.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

pub(crate) fn has_class(node: &NodeRef, class: &str) -> bool {
    class_list(node).iter().any(|candidate| candidate == class)
}

fn add_class(node: &NodeRef, class: &str) {
    let mut classes = class_list(node);
    if !classes.iter().any(|existing| existing == class) {
        classes.push(class.to_string());
        set_attribute(node, "class", &classes.join(" "));
    }
}

pub(crate) fn tag_name(node: &NodeRef) -> Option<String> {
    node.as_element()
        .map(|element| element.name.local.to_string().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuchiki::iter::NodeIterator;

    fn prepared(html: &str) -> NodeRef {
        let document = parse(html);
        normalize(&document);
        sanitize(&document);
        document
    }

    fn body_html(document: &NodeRef) -> String {
        let body = document.select_first("body").unwrap();
        body.as_node()
            .children()
            .map(|child| child.to_string())
            .collect::<String>()
    }

    #[test]
    fn fragments_get_html_head_and_body() {
        let document = parse("<p>one</p><p>two</p>");
        normalize(&document);

        assert!(document.select_first("html > head").is_ok());
        let paragraphs: Vec<_> = document.select("html > body > p").unwrap().collect();
        assert_eq!(paragraphs.len(), 2);
    }

    #[test]
    fn tag_names_are_owned_lowercase_strings() {
        let document = parse("<DIV><TD>cell</TD><P>text</P></DIV>");
        let div = document.select_first("div").unwrap();
        let name: Option<String> = tag_name(div.as_node());
        assert_eq!(name.as_deref(), Some("div"));

        let text = div.as_node().descendants().text_nodes().next().unwrap();
        assert_eq!(tag_name(text.as_node()), None);
    }

    #[test]
    fn complete_documents_are_left_alone() {
        let document = parse("<html><head><title>x</title></head><body><p>a</p></body></html>");
        normalize(&document);
        assert_eq!(document.select("body").unwrap().count(), 1);
        assert_eq!(body_html(&document), "<p>a</p>");
    }

    #[test]
    fn message_box_in_list_is_hoisted() {
        let document =
            prepared(r#"<ul id="l"><li>keep</li><li>tip<div class="msg">note</div></li></ul>"#);

        assert_eq!(
            body_html(&document),
            concat!(
                "<ul><li>tip</li></ul>",
                r#"<div class="wide"><div class="avoid-break wide"><div class="msg">note</div></div></div>"#,
                r#"<ul id="l"><li>keep</li></ul>"#,
            )
        );
    }

    #[test]
    fn pre_is_trimmed_and_wrapped() {
        let document = prepared("<pre class=\"shell\">\n  ls -la\n\n</pre>");
        assert_eq!(
            body_html(&document),
            concat!(
                r#"<div class="wide"><div class="avoid-break wide">"#,
                r#"<div class="shell pre"><pre class="shell">ls -la</pre></div>"#,
                "</div></div>"
            )
        );
    }

    #[test]
    fn code_headings_and_images() {
        let document =
            prepared(r#"<h2>T</h2><p><code>x</code></p><img class="big" src="a.png"><img class="inline" src="b.png">"#);

        let html = body_html(&document);
        assert!(html.contains(r#"<h2 data-pdf-bookmark="exclude">T</h2>"#));
        assert!(html.contains(r#"<span class="code"><code>x</code></span>"#));
        assert!(html.contains(
            r#"<br><div class="big docetimage"><img class="big docetimage" src="a.png"></div><br>"#
        ));
        assert!(html.contains(r#"<img class="inline" src="b.png">"#));
    }

    #[test]
    fn chrome_is_injected_around_content() {
        let document = prepared(r#"<div id="main">body</div>"#);
        inject(
            &document,
            r#"<link rel="stylesheet" href="a.css">"#,
            Some(r#"<div id="pdf-header">H</div><div id="pdf-footer">F</div>"#),
        );
        insert_anchor(&document, "intro");

        assert!(document
            .select_first(r#"head > link[href="a.css"]"#)
            .is_ok());
        assert_eq!(
            body_html(&document),
            concat!(
                r#"<div id="pdf-header">H</div><div id="pdf-footer">F</div>"#,
                r#"<a name="intro"></a><div id="main">body</div>"#
            )
        );
    }

    #[test]
    fn anchor_without_main_goes_first() {
        let document = prepared("<p>x</p>");
        insert_anchor(&document, "faq");
        assert_eq!(body_html(&document), r#"<a name="faq"></a><p>x</p>"#);
    }
}
