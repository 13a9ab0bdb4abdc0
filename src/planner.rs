//! Insertion planning
//!
//! Decides how a result container is spliced into the document: replacing
//! the selected range in place, or appending next to it. Replacement is only
//! attempted when the selection stays inside one block and touches nothing
//! interactive or preformatted; everything else appends.
//!
//! Appending walks a fixed ladder and the first step that succeeds wins:
//!
//! 1. the collapsed end of the selection,
//! 2. right after the block holding the start of the selection,
//! 3. right after the captured source element,
//! 4. as last child of the current selected element,
//! 5. as last child of `<body>`.
//!
//! A [`DomError`](crate::error::DomError) at any step only moves the ladder
//! on; it never aborts the translate action.

use tracing::{debug, warn};

use crate::anchor::Anchor;
use crate::capture::SelectionSnapshot;
use crate::dom::{Document, NodeId, Range};
use crate::error::DomResult;
use crate::markers::CONTAINER_FOR_ATTR;
use crate::settings::DisplayMode;

/// Tags that delimit a block for the purpose of replacement
pub const BLOCK_TAGS: &[&str] = &[
    "p",
    "li",
    "div",
    "section",
    "article",
    "blockquote",
    "pre",
    "td",
    "th",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
];

/// Tags whose content must never be restructured
pub const DISALLOWED_TAGS: &[&str] = &[
    "a", "button", "code", "pre", "input", "textarea", "select", "option",
];

/// Element used for the result container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerShape {
    /// `<span>`, for selections inside inline content
    Inline,
    /// `<div>`
    Block,
}

impl ContainerShape {
    pub fn tag(self) -> &'static str {
        match self {
            ContainerShape::Inline => "span",
            ContainerShape::Block => "div",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Replace,
    Append,
}

/// Where the container ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    ReplacedRange,
    RangeEnd,
    AfterStartBlock,
    AfterSource,
    InSelectedElement,
    Body,
}

/// Instructions produced by [`InsertionPlanner::plan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertionPlan {
    pub anchor_id: String,
    pub strategy: Strategy,
    pub shape: ContainerShape,
    pub range: Option<Range>,
    pub start_block: Option<NodeId>,
    pub end_block: Option<NodeId>,
    pub source_element: NodeId,
    pub crosses_blocks: bool,
    pub in_disallowed_context: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct InsertionPlanner;

impl InsertionPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Decide strategy and container shape for a snapshot.
    ///
    /// Editable snapshots ask for replacement whatever the display mode, so
    /// the result is written back where the text was.
    pub fn plan(
        &self,
        doc: &Document,
        snapshot: &SelectionSnapshot,
        anchor: &Anchor,
        mode: DisplayMode,
    ) -> InsertionPlan {
        let range = snapshot.range.clone();
        let start_block = range
            .as_ref()
            .and_then(|r| block_ancestor(doc, r.start().node));
        let end_block = range
            .as_ref()
            .and_then(|r| block_ancestor(doc, r.end().node));
        let crosses_blocks = range.is_some() && start_block != end_block;

        let mut probes: Vec<NodeId> = anchor.element.into_iter().collect();
        match &range {
            Some(r) => probes.extend([r.start().node, r.end().node]),
            None => probes.push(snapshot.source_element),
        }
        let in_disallowed_context = probes.into_iter().any(|n| in_disallowed_context(doc, n));

        let wants_replace = mode == DisplayMode::Replace || snapshot.editable;
        let strategy = if wants_replace && range.is_some() && !crosses_blocks && !in_disallowed_context
        {
            Strategy::Replace
        } else {
            Strategy::Append
        };

        // A replacement sits where the text was, which is phrasing content.
        let shape = match strategy {
            Strategy::Replace => ContainerShape::Inline,
            Strategy::Append => {
                let reference = anchor
                    .element
                    .or_else(|| doc.closest_element(snapshot.source_element));
                match reference {
                    Some(element) if doc.computed_display(element).is_inline_level() => {
                        ContainerShape::Inline
                    }
                    _ => ContainerShape::Block,
                }
            }
        };

        debug!(
            anchor = %anchor.id,
            ?strategy,
            ?shape,
            crosses_blocks,
            in_disallowed_context,
            "planned insertion"
        );

        InsertionPlan {
            anchor_id: anchor.id.clone(),
            strategy,
            shape,
            range,
            start_block,
            end_block,
            source_element: snapshot.source_element,
            crosses_blocks,
            in_disallowed_context,
        }
    }

    /// Insert `container` according to `plan`.
    ///
    /// Containers already bound to the same anchor are removed first, with
    /// no suspension point in between. The live selection is cleared
    /// afterwards. Only a failure of the final `<body>` step is an error.
    pub fn execute(
        &self,
        doc: &mut Document,
        plan: &InsertionPlan,
        container: NodeId,
        selected_element: Option<NodeId>,
    ) -> DomResult<Placement> {
        for existing in doc.find_by_attribute(CONTAINER_FOR_ATTR, &plan.anchor_id) {
            if existing != container {
                debug!(anchor = %plan.anchor_id, "removing superseded container");
                doc.remove(existing);
            }
        }

        let placement = match plan.strategy {
            Strategy::Replace => match replace_range(doc, plan, container) {
                Ok(()) => Ok(Placement::ReplacedRange),
                Err(err) => {
                    debug!(%err, "replacement failed; appending instead");
                    append(doc, plan, container, selected_element)
                }
            },
            Strategy::Append => append(doc, plan, container, selected_element),
        };

        doc.clear_selection();
        placement
    }
}

/// Nearest inclusive ancestor whose tag delimits a block
pub fn block_ancestor(doc: &Document, node: NodeId) -> Option<NodeId> {
    doc.ancestors(node)
        .find(|&n| doc.tag(n).is_some_and(|tag| BLOCK_TAGS.contains(&tag)))
}

pub fn in_disallowed_context(doc: &Document, node: NodeId) -> bool {
    doc.ancestors(node)
        .any(|n| doc.tag(n).is_some_and(|tag| DISALLOWED_TAGS.contains(&tag)))
}

fn replace_range(doc: &mut Document, plan: &InsertionPlan, container: NodeId) -> DomResult<()> {
    let Some(range) = &plan.range else {
        return Err(crate::error::DomError::InvalidRange(
            "nothing to replace".to_string(),
        ));
    };
    let mut range = range.clone();
    range.delete_contents(doc)?;
    range.insert_node(doc, container)
}

fn append(
    doc: &mut Document,
    plan: &InsertionPlan,
    container: NodeId,
    selected_element: Option<NodeId>,
) -> DomResult<Placement> {
    if let Some(range) = &plan.range {
        let mut end = range.clone();
        end.collapse_to_end();
        if attempt(Placement::RangeEnd, end.insert_node(doc, container)) {
            return Ok(Placement::RangeEnd);
        }
    }
    if let Some(block) = plan.start_block {
        if attempt(Placement::AfterStartBlock, doc.insert_after(block, container)) {
            return Ok(Placement::AfterStartBlock);
        }
    }
    if attempt(
        Placement::AfterSource,
        doc.insert_after(plan.source_element, container),
    ) {
        return Ok(Placement::AfterSource);
    }
    if let Some(element) = selected_element {
        if attempt(
            Placement::InSelectedElement,
            doc.append_child(element, container),
        ) {
            return Ok(Placement::InSelectedElement);
        }
    }
    warn!(anchor = %plan.anchor_id, "no better insertion point; appending to body");
    let body = doc.body();
    doc.append_child(body, container)?;
    Ok(Placement::Body)
}

fn attempt(step: Placement, result: DomResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            debug!(?step, %err, "insertion step failed");
            false
        }
    }
}
