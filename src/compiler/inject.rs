//! Generated code snippets.
//!
//! Every injected binding uses a `__$hmr_*$__` name so it cannot collide
//! with user code.

use crate::classify::ChangeRecord;
use crate::compiler::ComponentId;

/// Local binding of the hot-reload manager.
pub const MANAGER: &str = "__$hmr_manager$__";
/// Local binding of the current component node inside a function component.
pub const NODE: &str = "__$hmr_node$__";
/// Property of the node carrying the published state getters.
pub const STATE: &str = "__$hmr_state$__";
/// Private class field that registers class component instances.
pub const CLASS_REGISTER: &str = "#__$hmr_register$__";

/// `import { manager as __$hmr_manager$__ } from "<client>";`
pub fn manager_import(client_module: &str) -> String {
    format!("import {{ manager as {MANAGER} }} from {};\n", js_string(client_module))
}

/// `import { getCurrentNode } from "<runtime>";`
pub fn current_node_import(current_node_fn: &str, runtime_module: &str) -> String {
    format!(
        "import {{ {current_node_fn} }} from {};\n",
        js_string(runtime_module)
    )
}

/// Node fetch and registration at the top of a function component body.
///
/// With captured state names, the getters are published on the node once
/// the body has finished running.
pub fn function_prelude(current_node_fn: &str, states: &[String]) -> String {
    let mut out = format!("\nconst {NODE} = {current_node_fn}();\n{MANAGER}.register({NODE});\n");
    if !states.is_empty() {
        let getters = states
            .iter()
            .map(|name| format!("get {name}() {{ return {name}; }}"))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "{NODE} && Promise.resolve().then(() => {{ {NODE}.{STATE} = {{ {getters} }}; }});\n"
        ));
    }
    out
}

/// Opening half of the state-restore wrapper around an initializer.
pub fn restore_open(name: &str) -> String {
    format!("{MANAGER}.getState({NODE}, {}) ?? (", js_string(name))
}

pub const RESTORE_CLOSE: &str = ")";

pub const THUNK_OPEN: &str = "() => (";
pub const THUNK_CLOSE: &str = ")";

/// First member of a class component body.
pub fn class_register(current_node_fn: &str) -> String {
    format!("\n{CLASS_REGISTER} = {MANAGER}.register({current_node_fn}());\n")
}

/// `__$hmr_manager$__.bindId(Local, "<id>", <change>);`
pub fn bind_id(local: &str, id: &ComponentId, change: Option<&ChangeRecord>) -> String {
    let change = change
        .and_then(|c| serde_json::to_string(c).ok())
        .unwrap_or_else(|| "null".to_string());
    format!(
        "{MANAGER}.bindId({local}, {}, {change});\n",
        js_string(id.as_str())
    )
}

/// Module hot-update handler. A string result from `update` means the
/// module could not be applied in place and a full reload is requested.
pub fn hot_handler() -> String {
    format!(
        "if (import.meta.hot) {{\n  import.meta.hot.accept((mod) => {{\n    if (!mod) return;\n    const reason = {MANAGER}.update(mod);\n    typeof reason === \"string\" && import.meta.hot.invalidate(reason);\n  }});\n}}\n"
    )
}

/// Double-quoted JS string literal.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_without_state() {
        let prelude = function_prelude("getCurrentNode", &[]);
        assert!(prelude.contains("const __$hmr_node$__ = getCurrentNode();"));
        assert!(prelude.contains("__$hmr_manager$__.register(__$hmr_node$__);"));
        assert!(!prelude.contains("Promise"));
    }

    #[test]
    fn test_prelude_publishes_getters() {
        let prelude = function_prelude("getCurrentNode", &["n".into(), "list".into()]);
        assert!(prelude.contains(
            "__$hmr_node$__ && Promise.resolve().then(() => { __$hmr_node$__.__$hmr_state$__ = { get n() { return n; }, get list() { return list; } }; });"
        ));
    }

    #[test]
    fn test_restore_wrapper() {
        assert_eq!(
            format!("{}ref(1){RESTORE_CLOSE}", restore_open("n")),
            r#"__$hmr_manager$__.getState(__$hmr_node$__, "n") ?? (ref(1))"#
        );
    }

    #[test]
    fn test_bind_id() {
        let id = ComponentId::from("abc");
        assert_eq!(
            bind_id("App", &id, None),
            "__$hmr_manager$__.bindId(App, \"abc\", null);\n"
        );
        let change = ChangeRecord {
            render_changed: true,
            logic_changed: false,
        };
        assert_eq!(
            bind_id("App", &id, Some(&change)),
            "__$hmr_manager$__.bindId(App, \"abc\", {\"renderChanged\":true,\"logicChanged\":false});\n"
        );
    }

    #[test]
    fn test_imports_escape_module_names() {
        assert_eq!(
            manager_import("@hotswap/client"),
            "import { manager as __$hmr_manager$__ } from \"@hotswap/client\";\n"
        );
        assert_eq!(
            current_node_import("getCurrentNode", "vitarx"),
            "import { getCurrentNode } from \"vitarx\";\n"
        );
    }

    #[test]
    fn test_hot_handler_invalidates_on_reason() {
        let handler = hot_handler();
        assert!(handler.contains("import.meta.hot.accept"));
        assert!(handler.contains("__$hmr_manager$__.update(mod)"));
        assert!(handler.contains("import.meta.hot.invalidate(reason)"));
    }
}
