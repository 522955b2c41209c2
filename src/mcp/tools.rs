//! MCP Tool definitions
//!
//! The two coordination tools exposed to agents.

use super::protocol::{InputSchema, ToolDefinition};
use serde_json::json;

/// Generate all tool definitions
pub fn all_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "check_status".to_string(),
            description: "Check status of files before editing. Returns orchestration commands."
                .to_string(),
            input_schema: InputSchema {
                schema_type: "object".to_string(),
                properties: Some(json!({
                    "username": {"type": "string", "description": "GitHub username used for lock attribution"},
                    "file_paths": {"type": "array", "items": {"type": "string"}, "description": "File paths to check (e.g., [\"src/auth.ts\", \"src/db.ts\"])"},
                    "agent_head": {"type": "string", "description": "Current git HEAD SHA of the working tree"},
                    "repo_url": {"type": "string", "description": "Repository URL"},
                    "branch": {"type": "string", "description": "Git branch name (default: master, falls back to main)"}
                })),
                required: Some(vec![
                    "username".to_string(),
                    "file_paths".to_string(),
                    "agent_head".to_string(),
                    "repo_url".to_string(),
                ]),
            },
        },
        ToolDefinition {
            name: "post_status".to_string(),
            description: "Update lock status for files. Supports atomic multi-file locking."
                .to_string(),
            input_schema: InputSchema {
                schema_type: "object".to_string(),
                properties: Some(json!({
                    "username": {"type": "string", "description": "GitHub username used for lock attribution"},
                    "file_paths": {"type": "array", "items": {"type": "string"}, "description": "File paths to lock or release"},
                    "status": {"type": "string", "enum": ["READING", "WRITING", "OPEN"], "description": "Lock status transition"},
                    "message": {"type": "string", "description": "Context message about what you're doing"},
                    "agent_head": {"type": "string", "description": "Current git HEAD SHA"},
                    "repo_url": {"type": "string", "description": "Repository URL"},
                    "branch": {"type": "string", "description": "Git branch name (default: master, falls back to main)"},
                    "new_repo_head": {"type": "string", "description": "New HEAD SHA after push (for OPEN status)"}
                })),
                required: Some(vec![
                    "username".to_string(),
                    "file_paths".to_string(),
                    "status".to_string(),
                    "message".to_string(),
                    "agent_head".to_string(),
                    "repo_url".to_string(),
                ]),
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_exactly_two_tools() {
        let tools = all_tools();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "check_status");
        assert_eq!(tools[1].name, "post_status");
    }

    #[test]
    fn schemas_declare_required_fields() {
        let tools = all_tools();
        let post = &tools[1];
        let required = post.input_schema.required.as_ref().unwrap();
        assert!(required.contains(&"status".to_string()));
        assert!(required.contains(&"message".to_string()));
        assert!(!required.contains(&"branch".to_string()));
    }
}
