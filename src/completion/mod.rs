use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionList, CompletionResponse, CompletionTextEdit,
    Documentation, MarkupContent, MarkupKind, Position, TextEdit,
};

use crate::{
    config::Settings,
    document::Document,
    resolver::PrefixResolver,
    syntax::SourceSpan,
    vocab::TermKind,
};

use self::{name_completer::NameCompleter, prefix_decl_completer::PrefixDeclCompleter};

mod name_completer;
mod prefix_decl_completer;
mod util;

#[derive(Clone, Copy)]
pub struct Context<'a> {
    document: &'a Document,
    resolver: &'a PrefixResolver,
    settings: &'a Settings,
}

pub trait Completer<'a>: Sized {
    fn construct(context: Context<'a>, offset: usize) -> Option<Self>;

    /// Candidates in presentation order.
    fn completions(&self) -> Vec<Candidate>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// A prefix declared in the document.
    LocalPrefix,
    /// A JSON-LD term defined by the active context.
    ContextTerm,
    Term(TermKind),
    /// A known prefix the document does not declare yet.
    SuggestedPrefix,
    /// A namespace IRI for a declaration being written.
    Namespace,
    Keyword,
}

/// Text inserted somewhere other than at the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub offset: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub label: String,
    pub kind: CandidateKind,
    pub insert_text: String,
    /// The typed text `insert_text` replaces.
    pub replace: SourceSpan,
    pub detail: Option<String>,
    pub documentation: Option<String>,
    /// A declaration the candidate needs, e.g. a missing `@prefix`.
    pub additional_edit: Option<Insertion>,
}

impl Candidate {
    fn to_completion_item(&self, document: &Document, rank: usize) -> CompletionItem {
        CompletionItem {
            label: self.label.clone(),
            kind: Some(match self.kind {
                CandidateKind::LocalPrefix | CandidateKind::SuggestedPrefix => {
                    CompletionItemKind::MODULE
                }
                CandidateKind::ContextTerm => CompletionItemKind::VARIABLE,
                CandidateKind::Term(TermKind::Class) => CompletionItemKind::CLASS,
                CandidateKind::Term(TermKind::Property) => CompletionItemKind::PROPERTY,
                CandidateKind::Term(TermKind::Other) => CompletionItemKind::VALUE,
                CandidateKind::Namespace => CompletionItemKind::REFERENCE,
                CandidateKind::Keyword => CompletionItemKind::KEYWORD,
            }),
            detail: self.detail.clone(),
            documentation: self.documentation.as_ref().map(|value| {
                Documentation::MarkupContent(MarkupContent {
                    kind: MarkupKind::Markdown,
                    value: value.clone(),
                })
            }),
            // editors re-sort by label otherwise
            sort_text: Some(format!("{rank:05}")),
            filter_text: Some(self.label.clone()),
            text_edit: Some(CompletionTextEdit::Edit(TextEdit {
                range: document.range_of(self.replace),
                new_text: self.insert_text.clone(),
            })),
            additional_text_edits: self.additional_edit.as_ref().map(|insertion| {
                vec![TextEdit {
                    range: document.range_of(SourceSpan::empty(insertion.offset)),
                    new_text: insertion.text.clone(),
                }]
            }),
            ..Default::default()
        }
    }
}

/// Ranked completion candidates at `offset`.
///
/// Inside a prefix declaration these are prefixes and namespaces. Elsewhere
/// they are, in order: prefixes declared in the document, terms of the
/// vocabulary the typed prefix names, known prefixes not declared yet and
/// keywords. At most [`Settings::max_completions`] are returned.
pub fn complete(
    document: &Document,
    offset: usize,
    resolver: &PrefixResolver,
    settings: &Settings,
) -> Vec<Candidate> {
    let context = Context {
        document,
        resolver,
        settings,
    };

    run_completer::<PrefixDeclCompleter>(context, offset)
        .or_else(|| run_completer::<NameCompleter>(context, offset))
        .unwrap_or_default()
}

fn run_completer<'a, T: Completer<'a>>(context: Context<'a>, offset: usize) -> Option<Vec<Candidate>> {
    let completer = T::construct(context, offset)?;
    let mut candidates = completer.completions();
    candidates.truncate(context.settings.max_completions);
    Some(candidates)
}

pub fn get_completions(
    document: &Document,
    position: Position,
    resolver: &PrefixResolver,
    settings: &Settings,
) -> Option<CompletionResponse> {
    let offset = document.offset_at(position);
    let items = complete(document, offset, resolver, settings)
        .iter()
        .enumerate()
        .map(|(rank, candidate)| candidate.to_completion_item(document, rank))
        .collect::<Vec<_>>();

    Some(CompletionResponse::List(CompletionList {
        is_incomplete: true,
        items,
    }))
}
