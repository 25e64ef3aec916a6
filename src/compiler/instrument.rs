//! Source instrumentation for hot reload.
//!
//! For every qualifying component the module gains:
//!
//! - a node fetch and registration prelude in the body,
//! - `getState(...) ?? (init)` around state declarations, with the state
//!   getters published on the node once the body has run,
//! - `return () => (render)` instead of returning the render call directly,
//! - a registering private field as the first member of class components,
//! - one `bindId` call per component and the module hot handler at the end.
//!
//! The source is parsed with oxc and edited by span, so everything not
//! touched keeps its original text and formatting.

use oxc::allocator::Allocator;
use oxc::ast::ast::{
    ArrowFunctionExpression, Class, Expression, FunctionBody, Program, Statement,
};
use oxc::parser::Parser;
use oxc::span::GetSpan;
use serde::Serialize;
use thiserror::Error;

use super::edit::TextEdits;
use super::identity::{ComponentId, IdentityAssigner, normalize_module_path};
use super::inject;
use super::scan::{self, Candidate, Definition, DefinitionKind};
use crate::classify::{ChangeRecord, Classifier, source_type_for};
use crate::config::{HotswapConfig, InstrumentConfig};

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("failed to parse `{filename}`: {message}")]
    Parse { filename: String, message: String },
}

/// One instrumented component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentedComponent {
    pub local: String,
    pub export: String,
    pub id: ComponentId,
    pub kind: DefinitionKind,
    /// Names of the state declarations wrapped in capture/restore.
    pub states: Vec<String>,
    /// Original text of the definition.
    pub source: String,
}

/// Result of instrumenting one module.
#[derive(Debug, Clone)]
pub struct Instrumented {
    pub code: String,
    pub components: Vec<InstrumentedComponent>,
    /// Source maps are left to the bundler; always `None`.
    pub map: Option<String>,
}

impl Instrumented {
    fn unchanged(source: &str) -> Self {
        Self {
            code: source.to_string(),
            components: Vec::new(),
            map: None,
        }
    }

    pub fn is_instrumented(&self) -> bool {
        !self.components.is_empty()
    }
}

/// Rewrites component modules. Keeps the identity memo across calls.
#[derive(Debug)]
pub struct Instrumentor {
    config: InstrumentConfig,
    classifier: Classifier,
    identities: IdentityAssigner,
}

impl Instrumentor {
    pub fn new(config: InstrumentConfig, classifier: Classifier) -> Self {
        Self {
            config,
            classifier,
            identities: IdentityAssigner::new(),
        }
    }

    pub fn from_config(config: &HotswapConfig) -> Self {
        Self::new(
            config.instrument.clone(),
            Classifier::from_config(&config.classify),
        )
    }

    pub fn identities(&self) -> &IdentityAssigner {
        &self.identities
    }

    /// Instrument `source`; `filename` is the module path used for identities.
    pub fn instrument(&mut self, source: &str, filename: &str) -> Result<Instrumented, InstrumentError> {
        self.instrument_with(source, filename, |_, _| None)
    }

    /// Like [`Self::instrument`], embedding the change record returned by
    /// `change(id, definition_source)` into each `bindId` call.
    pub fn instrument_with<F>(
        &mut self,
        source: &str,
        filename: &str,
        mut change: F,
    ) -> Result<Instrumented, InstrumentError>
    where
        F: FnMut(&ComponentId, &str) -> Option<ChangeRecord>,
    {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, source_type_for(filename)).parse();
        if let Some(err) = ret.errors.first() {
            return Err(InstrumentError::Parse {
                filename: filename.to_string(),
                message: err.to_string(),
            });
        }
        if ret.panicked {
            return Err(InstrumentError::Parse {
                filename: filename.to_string(),
                message: "parser aborted".to_string(),
            });
        }

        let program = &ret.program;
        let candidates = scan::scan(program, &self.config.render_method);
        if candidates.is_empty() {
            return Ok(Instrumented::unchanged(source));
        }

        let module = normalize_module_path(filename);
        let mut edits = TextEdits::new();
        let mut components = Vec::with_capacity(candidates.len());
        let mut trailer = String::from("\n");

        for candidate in &candidates {
            let states = self.instrument_definition(candidate, &mut edits);
            let span = candidate.definition.span();
            let definition_source = &source[span.start as usize..span.end as usize];
            let id = self.identities.assign(&module, &candidate.export);
            let record = change(&id, definition_source);
            trailer.push_str(&inject::bind_id(&candidate.local, &id, record.as_ref()));
            components.push(InstrumentedComponent {
                local: candidate.local.clone(),
                export: candidate.export.clone(),
                id,
                kind: candidate.definition.kind(),
                states,
                source: definition_source.to_string(),
            });
        }

        edits.insert(scan::header_end(program), self.header(program));
        trailer.push_str(&inject::hot_handler());
        edits.insert(source.len() as u32, trailer);

        crate::debug!("compile"; "instrumented {} component(s) in {}", components.len(), module);
        Ok(Instrumented {
            code: edits.apply(source),
            components,
            map: None,
        })
    }

    /// Imports added at the top of an instrumented module.
    fn header(&self, program: &Program<'_>) -> String {
        let mut header = String::from("\n");
        header.push_str(&inject::manager_import(&self.config.client_module));
        if !scan::imports_binding(program, &self.config.current_node_fn) {
            header.push_str(&inject::current_node_import(
                &self.config.current_node_fn,
                &self.config.runtime_module,
            ));
        }
        header
    }

    /// Record the edits for one definition; returns the captured state names.
    fn instrument_definition(&self, candidate: &Candidate<'_, '_>, edits: &mut TextEdits) -> Vec<String> {
        match candidate.definition {
            Definition::Function(f) => match &f.body {
                Some(body) => self.instrument_block(body, edits),
                None => Vec::new(),
            },
            Definition::Arrow(arrow) => self.instrument_arrow(arrow, edits),
            Definition::Class(class) => {
                self.instrument_class(class, edits);
                Vec::new()
            }
        }
    }

    fn instrument_arrow(&self, arrow: &ArrowFunctionExpression<'_>, edits: &mut TextEdits) -> Vec<String> {
        if !arrow.expression {
            return self.instrument_block(&arrow.body, edits);
        }
        let Some(Statement::ExpressionStatement(stmt)) = arrow.body.statements.first() else {
            return Vec::new();
        };

        // `() => view(x)` becomes `() => { <prelude> return () => (view(x)); }`
        let expr = &stmt.expression;
        let span = expr.span();
        let thunk = self.is_render_call(expr);
        let mut open = String::from("{");
        open.push_str(&inject::function_prelude(&self.config.current_node_fn, &[]));
        open.push_str("return ");
        if thunk {
            open.push_str(inject::THUNK_OPEN);
        }
        let mut close = String::new();
        if thunk {
            close.push_str(inject::THUNK_CLOSE);
        }
        close.push_str(";\n}");
        edits.insert(span.start, open);
        edits.insert(span.end, close);
        Vec::new()
    }

    fn instrument_block(&self, body: &FunctionBody<'_>, edits: &mut TextEdits) -> Vec<String> {
        let mut states = Vec::new();
        for stmt in &body.statements {
            match stmt {
                Statement::VariableDeclaration(decl) => {
                    for declarator in &decl.declarations {
                        let (Some(name), Some(init)) =
                            (declarator.id.get_identifier_name(), &declarator.init)
                        else {
                            continue;
                        };
                        if !self.is_state_constructor(init) {
                            continue;
                        }
                        let span = init.span();
                        edits.insert(span.start, inject::restore_open(&name));
                        edits.insert(span.end, inject::RESTORE_CLOSE);
                        states.push(name.to_string());
                    }
                }
                Statement::ReturnStatement(ret) => {
                    if let Some(argument) = &ret.argument
                        && self.is_render_call(argument)
                    {
                        let span = argument.span();
                        edits.insert(span.start, inject::THUNK_OPEN);
                        edits.insert(span.end, inject::THUNK_CLOSE);
                    }
                }
                _ => {}
            }
        }

        let at = body
            .directives
            .last()
            .map_or(body.span.start + 1, |d| d.span.end);
        edits.insert(at, inject::function_prelude(&self.config.current_node_fn, &states));
        states
    }

    fn instrument_class(&self, class: &Class<'_>, edits: &mut TextEdits) {
        edits.insert(
            class.body.span.start + 1,
            inject::class_register(&self.config.current_node_fn),
        );
    }

    /// Render construction: a configured callee or unlowered JSX.
    fn is_render_call(&self, expr: &Expression<'_>) -> bool {
        match scan::strip_parens(expr) {
            Expression::CallExpression(call) => crate::classify::callee_name(&call.callee)
                .is_some_and(|name| self.classifier.is_render_callee(name)),
            Expression::JSXElement(_) | Expression::JSXFragment(_) => true,
            _ => false,
        }
    }

    fn is_state_constructor(&self, expr: &Expression<'_>) -> bool {
        match scan::strip_parens(expr) {
            Expression::CallExpression(call) => match &call.callee {
                Expression::Identifier(ident) => self
                    .config
                    .state_constructors
                    .iter()
                    .any(|ctor| ctor.as_str() == ident.name.as_str()),
                _ => false,
            },
            _ => false,
        }
    }
}
