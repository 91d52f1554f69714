//! Decides which protocol calls are exempt from authentication.
//!
//! Pure functions over the call and a catalog snapshot. Enumeration is always
//! public so clients can discover whether they need credentials at all; reading
//! one entry is public only when that entry opts out of auth; unknown entries
//! and every other method fail closed.

use serde_json::Value;

use crate::catalog::Catalog;

pub const RESOURCES_LIST: &str = "resources/list";
pub const RESOURCE_TEMPLATES_LIST: &str = "resources/templates/list";
pub const PROMPTS_LIST: &str = "prompts/list";
pub const RESOURCES_READ: &str = "resources/read";
pub const PROMPTS_GET: &str = "prompts/get";

/// Whether a single call is public.
pub fn is_public(method: &str, params: &Value, catalog: &Catalog) -> bool {
    match method {
        RESOURCES_LIST | RESOURCE_TEMPLATES_LIST | PROMPTS_LIST => true,
        RESOURCES_READ => params
            .get("uri")
            .and_then(Value::as_str)
            .and_then(|uri| catalog.resource(uri))
            .is_some_and(|resource| !resource.require_auth),
        PROMPTS_GET => params
            .get("name")
            .and_then(Value::as_str)
            .and_then(|name| catalog.prompt(name))
            .is_some_and(|prompt| !prompt.require_auth),
        _ => false,
    }
}

/// Whether a JSON-RPC request body is public.
///
/// A batch is public only when it is non-empty and every message in it is.
pub fn is_public_body(body: &Value, catalog: &Catalog) -> bool {
    match body {
        Value::Array(messages) => {
            !messages.is_empty() && messages.iter().all(|m| is_public_message(m, catalog))
        }
        Value::Object(_) => is_public_message(body, catalog),
        _ => false,
    }
}

fn is_public_message(message: &Value, catalog: &Catalog) -> bool {
    let Some(method) = method_of(message) else {
        return false;
    };
    let params = message.get("params").unwrap_or(&Value::Null);
    is_public(method, params, catalog)
}

/// Method name(s) carried by a JSON-RPC body, for diagnostics.
pub fn rpc_methods(body: &Value) -> Vec<&str> {
    match body {
        Value::Array(messages) => messages.iter().filter_map(method_of).collect(),
        other => method_of(other).into_iter().collect(),
    }
}

fn method_of(message: &Value) -> Option<&str> {
    message.get("method").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogPrompt, CatalogResource};
    use serde_json::json;

    fn resource(uri: &str, require_auth: bool) -> CatalogResource {
        CatalogResource {
            uri: uri.to_string(),
            name: uri.to_string(),
            description: None,
            mime_type: None,
            text: String::new(),
            require_auth,
        }
    }

    fn prompt(name: &str, require_auth: bool) -> CatalogPrompt {
        CatalogPrompt {
            name: name.to_string(),
            description: None,
            text: String::new(),
            require_auth,
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(
            vec![resource("docs://open", false), resource("docs://locked", true)],
            vec![prompt("greet", false), prompt("secret", true)],
        )
    }

    #[test]
    fn test_list_methods_always_public() {
        for catalog in [Catalog::default(), catalog()] {
            assert!(is_public(RESOURCES_LIST, &Value::Null, &catalog));
            assert!(is_public(RESOURCE_TEMPLATES_LIST, &json!({}), &catalog));
            assert!(is_public(PROMPTS_LIST, &json!({"cursor": "x"}), &catalog));
        }
    }

    #[test]
    fn test_read_public_resource() {
        assert!(is_public(RESOURCES_READ, &json!({"uri": "docs://open"}), &catalog()));
    }

    #[test]
    fn test_read_locked_or_unknown_resource() {
        let catalog = catalog();
        assert!(!is_public(RESOURCES_READ, &json!({"uri": "docs://locked"}), &catalog));
        assert!(!is_public(RESOURCES_READ, &json!({"uri": "docs://missing"}), &catalog));
        assert!(!is_public(RESOURCES_READ, &json!({}), &catalog));
        assert!(!is_public(RESOURCES_READ, &json!({"uri": 7}), &catalog));
    }

    #[test]
    fn test_get_prompt() {
        let catalog = catalog();
        assert!(is_public(PROMPTS_GET, &json!({"name": "greet"}), &catalog));
        assert!(!is_public(PROMPTS_GET, &json!({"name": "secret"}), &catalog));
        assert!(!is_public(PROMPTS_GET, &json!({"name": "missing"}), &catalog));
    }

    #[test]
    fn test_unflagged_entry_from_catalog_file_is_not_public() {
        let catalog = Catalog::from_toml(
            r#"
            [[resources]]
            uri = "docs://unflagged"
            name = "unflagged"
            "#,
        )
        .unwrap();
        assert!(!is_public(RESOURCES_READ, &json!({"uri": "docs://unflagged"}), &catalog));
    }

    #[test]
    fn test_other_methods_not_public() {
        let catalog = catalog();
        for method in ["tools/call", "tools/list", "initialize", "ping", "resources/subscribe"] {
            assert!(!is_public(method, &json!({"uri": "docs://open", "name": "greet"}), &catalog));
        }
    }

    #[test]
    fn test_body_single_and_batch() {
        let catalog = catalog();
        let single = json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"});
        assert!(is_public_body(&single, &catalog));

        let all_public = json!([
            {"jsonrpc": "2.0", "id": 1, "method": "prompts/list"},
            {"jsonrpc": "2.0", "id": 2, "method": "prompts/get", "params": {"name": "greet"}}
        ]);
        assert!(is_public_body(&all_public, &catalog));

        let mixed = json!([
            {"jsonrpc": "2.0", "id": 1, "method": "prompts/list"},
            {"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {"name": "x"}}
        ]);
        assert!(!is_public_body(&mixed, &catalog));
        assert!(!is_public_body(&json!([]), &catalog));
        assert!(!is_public_body(&json!("resources/list"), &catalog));
        assert!(!is_public_body(&json!({"jsonrpc": "2.0", "id": 1}), &catalog));
    }

    #[test]
    fn test_rpc_methods() {
        let batch = json!([{"method": "a"}, {"id": 1}, {"method": "b"}]);
        assert_eq!(rpc_methods(&batch), vec!["a", "b"]);
        assert_eq!(rpc_methods(&json!({"method": "tools/call"})), vec!["tools/call"]);
        assert!(rpc_methods(&json!(null)).is_empty());
    }
}
