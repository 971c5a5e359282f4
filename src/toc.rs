//! Table of contents generation and sizing.
//!
//! The TOC prints the page numbers of the parts after it, which depend on its own length. It is
//! rendered assuming one page; when the render disagrees it is rendered again with the measured
//! page count, up to [`MAX_TOC_PASSES`] times.

use log::{debug, warn};

use crate::layout::LayoutError;
use crate::model::{Part, PartId, PartList};
use crate::renderer::PartRenderer;

/// Upper bound on TOC renders per build.
pub const MAX_TOC_PASSES: usize = 4;

/// One TOC row: a body part, its bullet label and the absolute page it starts on.
#[derive(Clone, Debug)]
pub struct TocNode<'a> {
    pub id: PartId,
    pub part: &'a Part,
    pub bullet: String,
    pub page: usize,
}

/// Bullet labels of every body part, indexed like the part list.
///
/// Roots are numbered `1`, `2`, ...; the j-th child of a part labelled `B` is `B.j`.
pub fn bullet_labels(parts: &PartList) -> Vec<String> {
    let mut labels: Vec<String> = Vec::with_capacity(parts.len());
    let mut child_counts = vec![0usize; parts.len()];
    let mut root_count = 0;

    for (_, part) in parts.iter() {
        let label = match part.parent() {
            Some(parent) => {
                let count = &mut child_counts[parent.index()];
                *count += 1;
                format!("{}.{}", labels[parent.index()], count)
            }
            None => {
                root_count += 1;
                root_count.to_string()
            }
        };
        labels.push(label);
    }
    labels
}

/// TOC rows for the given first body page, in part order.
pub fn toc_nodes(parts: &PartList, first_body_page: usize) -> Vec<TocNode<'_>> {
    let mut page = first_body_page;
    parts
        .iter()
        .zip(bullet_labels(parts))
        .map(|((id, part), bullet)| {
            let node = TocNode {
                id,
                part,
                bullet,
                page,
            };
            page += part.page_count();
            node
        })
        .collect()
}

/// Generates the TOC page: `#main > #toc` holding nested lists of bullet, name and page rows.
pub fn toc_html(parts: &PartList, first_body_page: usize, title: &str) -> String {
    let nodes = toc_nodes(parts, first_body_page);
    let mut html = String::from(r#"<div id="main">"#);
    if !title.is_empty() {
        html.push_str(&format!("<h1>{}</h1>", escape_html(title)));
    }
    html.push_str(r#"<div id="toc">"#);
    push_list(&mut html, parts, &nodes, None);
    html.push_str("</div></div>");
    html
}

fn push_list(html: &mut String, parts: &PartList, nodes: &[TocNode<'_>], parent: Option<PartId>) {
    let children: Vec<PartId> = parts.children_of(parent).collect();
    if children.is_empty() {
        return;
    }

    html.push_str(r#"<ol class="plain">"#);
    for id in children {
        let node = &nodes[id.index()];
        html.push_str(&format!(
            concat!(
                r#"<li><table class="l{level}"><tr>"#,
                r#"<td class="toc-bullet" width="10%">{bullet}</td>"#,
                r#"<td class="toc-name">{name}</td>"#,
                r#"<td class="fill" width="5%"></td>"#,
                r#"<td class="toc-page" align="right" width="10%">{page}</td>"#,
                "</tr></table>"
            ),
            level = node.part.level(),
            bullet = node.bullet,
            name = escape_html(node.part.name()),
            page = node.page,
        ));
        push_list(html, parts, nodes, Some(id));
        html.push_str("</li>");
    }
    html.push_str("</ol>");
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Renders the TOC until its page count agrees with the count its page numbers assumed.
pub fn size_toc(
    renderer: &mut PartRenderer<'_>,
    parts: &PartList,
    cover_pages: usize,
    title: &str,
) -> Result<Part, LayoutError> {
    let mut assumed = 1;
    let mut pass = 1;

    loop {
        let first_body_page = cover_pages + assumed + 1;
        let toc = renderer.render_toc(&toc_html(parts, first_body_page, title), title)?;
        let actual = toc.page_count();
        debug!(
            "TOC pass {}: assumed {} page(s), rendered {}",
            pass, assumed, actual
        );

        if actual == assumed {
            return Ok(toc);
        }
        if pass >= MAX_TOC_PASSES {
            warn!(
                "TOC page count did not settle after {} passes; using {} page(s)",
                MAX_TOC_PASSES, actual
            );
            return Ok(toc);
        }
        assumed = actual;
        pass += 1;
    }
}
