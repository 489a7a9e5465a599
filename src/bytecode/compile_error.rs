#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// Call to a name that is neither a declared function nor a builtin.
    #[error("compile error: unknown function '{name}'\n  hint: {hint}")]
    UnknownFunction { name: String, hint: String },

    /// A function declaration that is not at the top level of the program.
    #[error(
        "compile error: function '{name}': declarations cannot appear inside {context}\n  hint: declare functions at the top level of the program"
    )]
    NestedFunction { name: String, context: String },

    #[error("compile error: function '{name}' is declared more than once")]
    DuplicateFunction { name: String },

    /// A declared function whose name is taken by a builtin; calls would never
    /// reach it.
    #[error("compile error: function '{name}' shadows the builtin of the same name")]
    ShadowsBuiltin { name: String },

    #[error("compile error: function '{function}' declares parameter '{param}' more than once")]
    DuplicateParameter { function: String, param: String },
}

impl CompileError {
    pub fn unknown_function(name: &str, builtins: &[&str]) -> Self {
        let hint = if builtins.is_empty() {
            "no builtins are registered".to_string()
        } else {
            format!("declare it, or call a builtin: {}", builtins.join(", "))
        };
        CompileError::UnknownFunction {
            name: name.to_string(),
            hint,
        }
    }

    pub fn nested_function(name: &str, context: &str) -> Self {
        CompileError::NestedFunction {
            name: name.to_string(),
            context: context.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_function_display() {
        let err = CompileError::unknown_function("fib", &["print", "abs"]);

        let msg = err.to_string();
        assert!(msg.contains("unknown function 'fib'"));
        assert!(msg.contains("hint"));
        assert!(msg.contains("print, abs"));
    }

    #[test]
    fn test_unknown_function_without_builtins() {
        let err = CompileError::unknown_function("f", &[]);
        assert!(err.to_string().contains("no builtins"));
    }

    #[test]
    fn test_nested_function_display() {
        let err = CompileError::nested_function("inner", "function 'outer'");

        let msg = err.to_string();
        assert!(msg.contains("inner"));
        assert!(msg.contains("function 'outer'"));
        assert!(msg.contains("top level"));
    }

    #[test]
    fn test_shadows_builtin_display() {
        let err = CompileError::ShadowsBuiltin {
            name: "print".to_string(),
        };
        assert!(err.to_string().contains("shadows the builtin"));
    }

    #[test]
    fn test_error_implements_std_error() {
        let err = CompileError::DuplicateFunction {
            name: "f".to_string(),
        };
        let _: &dyn std::error::Error = &err;
    }
}
