//! Donut hole markers: emission, filling and stripping.
//!
//! A donut hole is written as
//! `<!--Donut#<token>#--><inner content><!--EndDonut-->`, where the token is
//! the sealed `ActionSettings` of the fragment. Holes may follow each other
//! or nest (an uncached fragment that excludes a fragment of its own).

use std::sync::Arc;

use donut_core::RequestContext;
use tracing::{debug, error};

use crate::action::{ActionSettings, ActionSettingsSerializer};
use crate::error::{DonutError, ProtocolError};
use crate::fragment::FragmentInvoker;

/// Opening sentinel of a donut hole marker.
pub const DONUT_START: &str = "<!--Donut#";

/// Terminates the token inside the opening marker.
pub const DONUT_TOKEN_END: &str = "#-->";

/// Closing sentinel of a donut hole.
pub const DONUT_END: &str = "<!--EndDonut-->";

/// Parsed markup.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Hole {
        token: &'a str,
        inner: Vec<Segment<'a>>,
    },
}

struct OpenHole<'a> {
    offset: usize,
    token: &'a str,
    inner: Vec<Segment<'a>>,
}

/// Split markup into text and (possibly nested) holes.
fn parse(markup: &str) -> Result<Vec<Segment<'_>>, ProtocolError> {
    let mut root: Vec<Segment<'_>> = Vec::new();
    let mut open: Vec<OpenHole<'_>> = Vec::new();
    let mut pos = 0;

    loop {
        let rest = &markup[pos..];
        let next_start = rest.find(DONUT_START);
        let next_end = rest.find(DONUT_END);

        let (at, is_start) = match (next_start, next_end) {
            (None, None) => break,
            (Some(s), None) => (s, true),
            (None, Some(e)) => (e, false),
            (Some(s), Some(e)) => (s.min(e), s < e),
        };

        let offset = pos + at;
        if at > 0 {
            let text = Segment::Text(&rest[..at]);
            match open.last_mut() {
                Some(hole) => hole.inner.push(text),
                None => root.push(text),
            }
        }

        if is_start {
            let token_start = offset + DONUT_START.len();
            let token_len = markup[token_start..]
                .find(DONUT_TOKEN_END)
                .ok_or(ProtocolError::MalformedMarker { offset })?;
            open.push(OpenHole {
                offset,
                token: &markup[token_start..token_start + token_len],
                inner: Vec::new(),
            });
            pos = token_start + token_len + DONUT_TOKEN_END.len();
        } else {
            let hole = open.pop().ok_or(ProtocolError::UnexpectedEndMarker { offset })?;
            let segment = Segment::Hole {
                token: hole.token,
                inner: hole.inner,
            };
            match open.last_mut() {
                Some(parent) => parent.inner.push(segment),
                None => root.push(segment),
            }
            pos = offset + DONUT_END.len();
        }
    }

    if let Some(hole) = open.first() {
        return Err(ProtocolError::UnterminatedMarker {
            offset: hole.offset,
        });
    }

    if pos < markup.len() {
        root.push(Segment::Text(&markup[pos..]));
    }

    Ok(root)
}

fn write_stripped(segments: &[Segment<'_>], out: &mut String) {
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Hole { inner, .. } => write_stripped(inner, out),
        }
    }
}

/// Replace every marker span with its inner content.
///
/// Applied to already-stripped markup this is the identity.
pub fn strip_markers(markup: &str) -> Result<String, ProtocolError> {
    let segments = parse(markup)?;
    let mut out = String::with_capacity(markup.len());
    write_stripped(&segments, &mut out);
    Ok(out)
}

/// Wrap fragment markup in a donut hole marker carrying `token`.
pub fn wrap_donut_hole(token: &str, inner: &str) -> String {
    let mut out =
        String::with_capacity(DONUT_START.len() + token.len() + DONUT_TOKEN_END.len() + inner.len() + DONUT_END.len());
    out.push_str(DONUT_START);
    out.push_str(token);
    out.push_str(DONUT_TOKEN_END);
    out.push_str(inner);
    out.push_str(DONUT_END);
    out
}

/// Emits, fills and strips donut holes.
#[derive(Clone)]
pub struct DonutHoleFiller {
    serializer: Arc<dyn ActionSettingsSerializer>,
}

impl std::fmt::Debug for DonutHoleFiller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DonutHoleFiller").finish_non_exhaustive()
    }
}

impl DonutHoleFiller {
    /// Create a filler using the given token codec.
    pub fn new(serializer: Arc<dyn ActionSettingsSerializer>) -> Self {
        Self { serializer }
    }

    /// Wrap fragment markup in a marker for `action`.
    pub fn wrap(&self, action: &ActionSettings, inner: &str) -> Result<String, ProtocolError> {
        let token = self.serializer.serialize(action)?;
        Ok(wrap_donut_hole(&token, inner))
    }

    /// Render a child action into the current output.
    ///
    /// When `exclude_from_parent_cache` is set the fragment is wrapped in a
    /// marker, so a cached copy of the parent re-renders it on every hit.
    pub fn render_action(
        &self,
        ctx: &mut RequestContext,
        invoker: &dyn FragmentInvoker,
        action: &ActionSettings,
        exclude_from_parent_cache: bool,
    ) -> Result<(), DonutError> {
        let content = invoker.render_fragment(action, ctx)?;

        if exclude_from_parent_cache {
            let wrapped = self.wrap(action, &content)?;
            ctx.write(&wrapped)?;
        } else {
            ctx.write(&content)?;
        }

        Ok(())
    }

    /// Re-render every donut hole in cached markup.
    ///
    /// Each outermost marker span is replaced by a fresh render of the
    /// fragment it names, against the current request. Markers the fresh
    /// render emits itself are stripped. Nothing is returned unless every
    /// hole was filled.
    pub fn fill_holes(
        &self,
        markup: &str,
        ctx: &mut RequestContext,
        invoker: &dyn FragmentInvoker,
    ) -> Result<String, DonutError> {
        let segments = parse(markup).inspect_err(|e| error!(error = %e, "cached markup is corrupt"))?;
        let mut out = String::with_capacity(markup.len());
        let mut filled = 0usize;

        for segment in &segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Hole { token, .. } => {
                    let action = self
                        .serializer
                        .deserialize(token)
                        .inspect_err(|e| error!(error = %e, "donut hole token rejected"))?;
                    let fresh = invoker.render_fragment(&action, ctx)?;
                    out.push_str(&strip_markers(&fresh)?);
                    filled += 1;
                }
            }
        }

        debug!(holes = filled, "filled donut holes");
        Ok(out)
    }

    /// Replace every marker span with its inner content.
    pub fn strip_markers(&self, markup: &str) -> Result<String, ProtocolError> {
        strip_markers(markup)
    }
}
