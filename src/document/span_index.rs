//! Offset to construct lookup, rebuilt after every parse.
//!
//! Constructs are kept ordered by start offset together with the running
//! maximum of their end offsets, so a lookup is a binary search followed by
//! a short backwards scan that stops as soon as nothing earlier can still
//! reach the queried offset.

use std::cmp::Reverse;
use std::collections::HashMap;

use crate::error::ModelError;
use crate::syntax::{ParseOutput, SourceSpan, TermPosition};

/// Identifies a construct of the current parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstructId {
    /// The whole document; returned when nothing more specific contains an offset.
    Document,
    Prefix(usize),
    PrefixLabel(usize),
    PrefixNamespace(usize),
    Base(usize),
    Graph(usize),
    GraphLabel(usize),
    Statement(usize),
    Term(usize, TermPosition),
    /// The datatype IRI of a literal term.
    Datatype(usize, TermPosition),
    Member(usize),
}

impl ConstructId {
    /// Higher is more specific.
    fn rank(&self) -> u8 {
        match self {
            ConstructId::Document => 0,
            ConstructId::Graph(_) => 1,
            ConstructId::Prefix(_) | ConstructId::Base(_) | ConstructId::Statement(_) => 2,
            ConstructId::PrefixLabel(_)
            | ConstructId::PrefixNamespace(_)
            | ConstructId::GraphLabel(_)
            | ConstructId::Term(..)
            | ConstructId::Member(_) => 3,
            ConstructId::Datatype(..) => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Construct {
    pub id: ConstructId,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Default)]
pub struct SpanIndex {
    entries: Vec<Construct>,
    max_end: Vec<usize>,
    spans: HashMap<ConstructId, SourceSpan>,
    text_len: usize,
}

impl SpanIndex {
    pub fn build(parsed: &ParseOutput, text_len: usize) -> SpanIndex {
        let mut entries = Vec::new();
        let mut push = |id: ConstructId, span: SourceSpan| entries.push(Construct { id, span });

        for (i, decl) in parsed.prefixes.iter().enumerate() {
            push(ConstructId::Prefix(i), decl.span);
            push(ConstructId::PrefixLabel(i), decl.label_span);
            push(ConstructId::PrefixNamespace(i), decl.namespace_span);
        }
        for (i, base) in parsed.bases.iter().enumerate() {
            push(ConstructId::Base(i), base.span);
        }
        for (i, graph) in parsed.graphs.iter().enumerate() {
            push(ConstructId::Graph(i), graph.span);
            if let Some(label) = &graph.label {
                push(ConstructId::GraphLabel(i), label.span);
            }
        }
        for (i, statement) in parsed.statements.iter().enumerate() {
            push(ConstructId::Statement(i), statement.span);
            for (position, term) in statement.terms() {
                push(ConstructId::Term(i, position), term.span);
                if let Some(datatype) = term.datatype() {
                    push(ConstructId::Datatype(i, position), datatype.span);
                }
            }
        }
        for (i, member) in parsed.members.iter().enumerate() {
            push(ConstructId::Member(i), member.span);
        }

        entries.retain(|c| !c.span.is_empty());
        entries.sort_by_key(|c| (c.span.start, Reverse(c.span.end)));

        let mut max_end = Vec::with_capacity(entries.len());
        let mut running = 0;
        for entry in &entries {
            running = running.max(entry.span.end);
            max_end.push(running);
        }

        let mut spans: HashMap<ConstructId, SourceSpan> =
            entries.iter().map(|c| (c.id, c.span)).collect();
        spans.insert(ConstructId::Document, SourceSpan::new(0, text_len));

        SpanIndex {
            entries,
            max_end,
            spans,
            text_len,
        }
    }

    /// The innermost construct containing `offset`.
    ///
    /// Offsets inside the text that no construct covers give the document
    /// itself; offsets at or past the end give `None`.
    pub fn lookup(&self, offset: usize) -> Option<Construct> {
        if offset >= self.text_len {
            return None;
        }

        let upper = self.entries.partition_point(|c| c.span.start <= offset);
        let mut best: Option<Construct> = None;
        for i in (0..upper).rev() {
            if self.max_end[i] <= offset {
                break;
            }
            let candidate = self.entries[i];
            if !candidate.span.contains(offset) {
                continue;
            }
            let better = match best {
                None => true,
                Some(current) => specificity(&candidate) <= specificity(&current),
            };
            if better {
                best = Some(candidate);
            }
        }

        Some(best.unwrap_or(Construct {
            id: ConstructId::Document,
            span: SourceSpan::new(0, self.text_len),
        }))
    }

    pub fn span_of(&self, id: ConstructId) -> Result<SourceSpan, ModelError> {
        self.spans
            .get(&id)
            .copied()
            .ok_or(ModelError::ConstructNotFound(id))
    }

    /// All constructs in start order.
    pub fn constructs(&self) -> &[Construct] {
        &self.entries
    }
}

/// Smaller is more specific: shortest span, then highest rank.
fn specificity(construct: &Construct) -> (usize, Reverse<u8>) {
    (construct.span.len(), Reverse(construct.id.rank()))
}
