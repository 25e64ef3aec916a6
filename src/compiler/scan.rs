//! Discovery of top-level component definitions.
//!
//! A component is a capitalized top-level function, `const` arrow/function
//! or class that the module exports, either directly or through an export
//! list / `export default Local`. Classes must also define the render method.

use oxc::ast::ast::{
    ArrowFunctionExpression, Class, ClassElement, Declaration, ExportDefaultDeclarationKind,
    Expression, Function, ImportDeclarationSpecifier, Program, PropertyKey, Statement,
    VariableDeclaration, VariableDeclarationKind,
};
use oxc::span::Span;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Export name used for `export default`.
pub const DEFAULT_EXPORT: &str = "default";

/// Whether a component is written as a function or as a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    Function,
    Class,
}

/// AST node holding a component definition.
#[derive(Debug, Clone, Copy)]
pub enum Definition<'s, 'a> {
    Function(&'s Function<'a>),
    Arrow(&'s ArrowFunctionExpression<'a>),
    Class(&'s Class<'a>),
}

impl Definition<'_, '_> {
    pub fn span(&self) -> Span {
        match self {
            Self::Function(f) => f.span,
            Self::Arrow(a) => a.span,
            Self::Class(c) => c.span,
        }
    }

    pub fn kind(&self) -> DefinitionKind {
        match self {
            Self::Function(_) | Self::Arrow(_) => DefinitionKind::Function,
            Self::Class(_) => DefinitionKind::Class,
        }
    }

    fn qualifies(&self, render_method: &str) -> bool {
        match self {
            Self::Function(f) => f.body.is_some(),
            Self::Arrow(_) => true,
            Self::Class(c) => has_render_method(c, render_method),
        }
    }
}

/// A qualifying component found at the top level of a module.
#[derive(Debug)]
pub struct Candidate<'s, 'a> {
    pub local: String,
    pub export: String,
    pub definition: Definition<'s, 'a>,
}

/// Find every qualifying component, in source order.
pub fn scan<'s, 'a>(program: &'s Program<'a>, render_method: &str) -> Vec<Candidate<'s, 'a>> {
    let mut decls: Vec<(String, Definition<'s, 'a>)> = Vec::new();
    // local binding -> first export name
    let mut exports: FxHashMap<String, String> = FxHashMap::default();

    for stmt in &program.body {
        match stmt {
            Statement::FunctionDeclaration(f) => push_function(f, &mut decls),
            Statement::ClassDeclaration(c) => push_class(c, &mut decls),
            Statement::VariableDeclaration(v) => push_variables(v, &mut decls),
            Statement::ExportNamedDeclaration(export) => {
                // re-exports from other modules are tracked there
                if export.source.is_some() {
                    continue;
                }
                if let Some(declaration) = &export.declaration {
                    let before = decls.len();
                    match declaration {
                        Declaration::FunctionDeclaration(f) => push_function(f, &mut decls),
                        Declaration::ClassDeclaration(c) => push_class(c, &mut decls),
                        Declaration::VariableDeclaration(v) => push_variables(v, &mut decls),
                        _ => {}
                    }
                    for (local, _) in &decls[before..] {
                        exports.entry(local.clone()).or_insert_with(|| local.clone());
                    }
                }
                for spec in &export.specifiers {
                    exports
                        .entry(spec.local.name().to_string())
                        .or_insert_with(|| spec.exported.name().to_string());
                }
            }
            Statement::ExportDefaultDeclaration(export) => match &export.declaration {
                ExportDefaultDeclarationKind::FunctionDeclaration(f) => {
                    if let Some(id) = &f.id {
                        decls.push((id.name.to_string(), Definition::Function(f)));
                        exports.insert(id.name.to_string(), DEFAULT_EXPORT.to_string());
                    }
                }
                ExportDefaultDeclarationKind::ClassDeclaration(c) => {
                    if let Some(id) = &c.id {
                        decls.push((id.name.to_string(), Definition::Class(c)));
                        exports.insert(id.name.to_string(), DEFAULT_EXPORT.to_string());
                    }
                }
                ExportDefaultDeclarationKind::Identifier(ident) => {
                    exports
                        .entry(ident.name.to_string())
                        .or_insert_with(|| DEFAULT_EXPORT.to_string());
                }
                _ => {}
            },
            _ => {}
        }
    }

    decls
        .into_iter()
        .filter(|(local, definition)| is_component_name(local) && definition.qualifies(render_method))
        .filter_map(|(local, definition)| {
            let export = exports.get(&local)?.clone();
            Some(Candidate {
                local,
                export,
                definition,
            })
        })
        .collect()
}

fn push_function<'s, 'a>(f: &'s Function<'a>, decls: &mut Vec<(String, Definition<'s, 'a>)>) {
    if let Some(id) = &f.id {
        decls.push((id.name.to_string(), Definition::Function(f)));
    }
}

fn push_class<'s, 'a>(c: &'s Class<'a>, decls: &mut Vec<(String, Definition<'s, 'a>)>) {
    if let Some(id) = &c.id {
        decls.push((id.name.to_string(), Definition::Class(c)));
    }
}

fn push_variables<'s, 'a>(
    v: &'s VariableDeclaration<'a>,
    decls: &mut Vec<(String, Definition<'s, 'a>)>,
) {
    if v.kind != VariableDeclarationKind::Const {
        return;
    }
    for declarator in &v.declarations {
        let Some(name) = declarator.id.get_identifier_name() else {
            continue;
        };
        let definition = match declarator.init.as_ref().map(strip_parens) {
            Some(Expression::ArrowFunctionExpression(a)) => Definition::Arrow(a),
            Some(Expression::FunctionExpression(f)) => Definition::Function(f),
            _ => continue,
        };
        decls.push((name.to_string(), definition));
    }
}

/// Component naming convention: first character is an uppercase letter.
pub fn is_component_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

fn has_render_method(class: &Class<'_>, render_method: &str) -> bool {
    class.body.body.iter().any(|element| match element {
        ClassElement::MethodDefinition(method) => {
            !method.r#static
                && matches!(&method.key, PropertyKey::StaticIdentifier(id) if id.name.as_str() == render_method)
        }
        _ => false,
    })
}

/// Look through any number of parentheses.
pub fn strip_parens<'s, 'a>(mut expr: &'s Expression<'a>) -> &'s Expression<'a> {
    while let Expression::ParenthesizedExpression(paren) = expr {
        expr = &paren.expression;
    }
    expr
}

/// Whether the module already binds `name` through an import.
pub fn imports_binding(program: &Program<'_>, name: &str) -> bool {
    program.body.iter().any(|stmt| {
        let Statement::ImportDeclaration(import) = stmt else {
            return false;
        };
        import.specifiers.iter().flatten().any(|spec| {
            let local = match spec {
                ImportDeclarationSpecifier::ImportSpecifier(s) => &s.local,
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => &s.local,
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => &s.local,
            };
            local.name.as_str() == name
        })
    })
}

/// Offset right after any hashbang and leading directives.
pub fn header_end(program: &Program<'_>) -> u32 {
    let hashbang = program.hashbang.as_ref().map_or(0, |h| h.span.end);
    let directives = program.directives.last().map_or(0, |d| d.span.end);
    hashbang.max(directives)
}
