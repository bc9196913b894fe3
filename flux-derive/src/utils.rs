//! Utility functions for code generation

/// Convert string to snake_case
pub fn snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            result.push('_');
        }
        result.extend(c.to_lowercase());
    }
    result
}

/// Default table name of a struct: snake_case plus a plural `s`
pub fn default_table_name(struct_name: &str) -> String {
    let snake = snake_case(struct_name);
    if snake.ends_with('s') {
        snake
    } else {
        format!("{snake}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("BlogPost"), "blog_post");
        assert_eq!(snake_case("user_id"), "user_id");
        assert_eq!(snake_case("User"), "user");
    }

    #[test]
    fn test_default_table_name() {
        assert_eq!(default_table_name("BlogPost"), "blog_posts");
        assert_eq!(default_table_name("Status"), "status");
    }
}
