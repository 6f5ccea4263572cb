//! Convenience macros for plugin development.

/// Macro for creating a `PluginInfo`.
///
/// # Example
/// ```rust,ignore
/// let info = plugin_info!(
///     name: "EchoPlugin",
///     title: "Echo",
///     version: "1.0.0",
///     author: "Dev"
/// );
/// ```
#[macro_export]
macro_rules! plugin_info {
    (
        name: $name:expr,
        title: $title:expr,
        version: $version:expr,
        author: $author:expr
    ) => {
        $crate::prelude::PluginInfo {
            name: $name.to_string(),
            title: $title.to_string(),
            author: $author.to_string(),
            version: $version.to_string(),
            description: String::new(),
        }
    };
    (
        name: $name:expr,
        title: $title:expr,
        version: $version:expr,
        author: $author:expr,
        description: $desc:expr
    ) => {
        $crate::prelude::PluginInfo {
            name: $name.to_string(),
            title: $title.to_string(),
            author: $author.to_string(),
            version: $version.to_string(),
            description: $desc.to_string(),
        }
    };
}

/// Macro for building positional `HookArgs`.
///
/// # Example
/// ```rust,ignore
/// let args = hook_args![HookArg::client(client), Bytes::from_static(b"hi")];
/// ```
#[macro_export]
macro_rules! hook_args {
    () => {
        $crate::prelude::HookArgs::new()
    };
    ($($arg:expr),+ $(,)?) => {
        $crate::prelude::HookArgs::new()$(.with($arg))+
    };
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    #[test]
    fn test_plugin_info_macro() {
        let info = plugin_info!(
            name: "Echo",
            title: "Echo Plugin",
            version: "1.2.3",
            author: "tests"
        );
        assert_eq!(info.name, "Echo");
        assert_eq!(info.version, "1.2.3");
        assert!(info.description.is_empty());
    }

    #[test]
    fn test_hook_args_macro() {
        let empty = hook_args![];
        assert!(empty.is_empty());

        let args = hook_args!["player", 3i64, json!({"x": 1})];
        assert_eq!(args.len(), 3);
        assert_eq!(args.value(2), Some(&json!({"x": 1})));
    }
}
