//! Render/logic separation of a component definition.
//!
//! ```text
//! source ──parse──► outermost render calls / JSX (spans)
//!    │                      │
//!    │                      └─► each span text ──normalize──► render fragments
//!    └─ spans replaced by a placeholder ──normalize──────────► logic text
//! ```
//!
//! Normalization reparses the text and prints it with the oxc code generator
//! in minified mode without comments, so formatting never counts as a change.

use oxc::allocator::Allocator;
use oxc::ast::ast::{CallExpression, Expression, JSXElement, JSXFragment};
use oxc::ast_visit::{Visit, walk};
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::parser::Parser;
use oxc::span::{SourceType, Span};
use rustc_hash::FxHashSet;

/// Identifier standing in for a removed render fragment in the logic text.
const RENDER_PLACEHOLDER: &str = "__$render$__";

/// Normalized halves of one component definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    /// Render-construction calls in source order.
    pub render: Vec<String>,
    /// Everything else, with render calls replaced by a placeholder.
    pub logic: String,
}

/// Split a definition into render fragments and logic text.
///
/// The text is wrapped in parentheses first so anonymous function and class
/// expressions parse the same way as declarations. `source_type` must match
/// the module the definition came from (TypeScript annotations, JSX).
pub fn split(source: &str, callees: &FxHashSet<String>, source_type: SourceType) -> Result<Split, String> {
    let wrapped = format!("({source}\n)");
    let spans = render_spans(&wrapped, callees, source_type)?;

    let mut render = Vec::with_capacity(spans.len());
    let mut logic = String::with_capacity(wrapped.len());
    let mut cursor = 0;
    for span in &spans {
        let (start, end) = (span.start as usize, span.end as usize);
        render.push(normalize(&wrapped[start..end], source_type)?);
        logic.push_str(&wrapped[cursor..start]);
        logic.push_str(RENDER_PLACEHOLDER);
        cursor = end;
    }
    logic.push_str(&wrapped[cursor..]);

    Ok(Split {
        render,
        logic: normalize(&logic, source_type)?,
    })
}

/// Spans of the outermost render calls and JSX trees, sorted by position.
fn render_spans(source: &str, callees: &FxHashSet<String>, source_type: SourceType) -> Result<Vec<Span>, String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type).parse();
    if let Some(err) = ret.errors.first() {
        return Err(err.to_string());
    }

    let mut collector = RenderCalls {
        callees,
        spans: Vec::new(),
    };
    collector.visit_program(&ret.program);

    let mut spans = collector.spans;
    spans.sort_by_key(|s| s.start);
    Ok(spans)
}

/// Reparse and print without whitespace or comments.
pub(crate) fn normalize(code: &str, source_type: SourceType) -> Result<String, String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, source_type).parse();
    if let Some(err) = ret.errors.first() {
        return Err(err.to_string());
    }
    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .build(&ret.program)
        .code;
    Ok(code)
}

/// Module JavaScript with JSX; used when the originating file is unknown.
pub fn default_source_type() -> SourceType {
    SourceType::mjs().with_jsx(true)
}

/// Source type from a file name. TypeScript keeps its own JSX setting;
/// everything else parses as module JavaScript with JSX.
pub fn source_type_for(filename: &str) -> SourceType {
    match SourceType::from_path(filename) {
        Ok(ty) if ty.is_typescript() => ty,
        Ok(ty) => ty.with_module(true).with_jsx(true),
        Err(_) => default_source_type(),
    }
}

/// Collects outermost render-construction calls.
struct RenderCalls<'c> {
    callees: &'c FxHashSet<String>,
    spans: Vec<Span>,
}

impl<'a> Visit<'a> for RenderCalls<'_> {
    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if callee_name(&it.callee).is_some_and(|name| is_render_callee(name, self.callees)) {
            // nested render calls are part of this fragment
            self.spans.push(it.span);
            return;
        }
        walk::walk_call_expression(self, it);
    }

    fn visit_jsx_element(&mut self, it: &JSXElement<'a>) {
        self.spans.push(it.span);
    }

    fn visit_jsx_fragment(&mut self, it: &JSXFragment<'a>) {
        self.spans.push(it.span);
    }
}

/// Name a call is made through: `jsx(..)`, `React.createElement(..)`,
/// `(0, _jsx)(..)`.
pub(crate) fn callee_name<'b>(callee: &'b Expression<'_>) -> Option<&'b str> {
    match callee {
        Expression::Identifier(ident) => Some(ident.name.as_str()),
        Expression::StaticMemberExpression(member) => Some(member.property.name.as_str()),
        Expression::ParenthesizedExpression(paren) => callee_name(&paren.expression),
        Expression::SequenceExpression(seq) => seq.expressions.last().and_then(callee_name),
        _ => None,
    }
}

/// Compiled output often renames imports to `_jsx`; match on the bare name.
pub(crate) fn is_render_callee(name: &str, callees: &FxHashSet<String>) -> bool {
    callees.contains(name.trim_start_matches('_'))
}
