//! Builders for conversation export JSON.

use serde_json::{Map, Value, json};

/// One message node in a built export.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    role: String,
    content: Value,
    create_time: Option<f64>,
    metadata: Map<String, Value>,
}

impl NodeSpec {
    fn new(role: &str, content: Value) -> Self {
        Self {
            role: role.to_string(),
            content,
            create_time: None,
            metadata: Map::new(),
        }
    }

    pub fn user(text: &str) -> Self {
        Self::new("user", text_content(text))
    }

    pub fn assistant(text: &str) -> Self {
        Self::new("assistant", text_content(text))
    }

    /// Assistant code payload, hidden by the parser.
    pub fn assistant_code(code: &str) -> Self {
        Self::new(
            "assistant",
            json!({"content_type": "code", "language": "json", "text": code}),
        )
    }

    pub fn tool(text: &str) -> Self {
        Self::new("tool", text_content(text))
    }

    pub fn editable_context(instructions: &str) -> Self {
        Self::new(
            "user",
            json!({"content_type": "user_editable_context", "user_instructions": instructions}),
        )
    }

    /// Arbitrary content object for the given role.
    pub fn raw(role: &str, content: Value) -> Self {
        Self::new(role, content)
    }

    pub fn created(mut self, create_time: f64) -> Self {
        self.create_time = Some(create_time);
        self
    }

    pub fn model(self, slug: &str) -> Self {
        self.meta("model_slug", Value::from(slug))
    }

    pub fn citations(self, citations: Vec<Value>) -> Self {
        self.meta("citations", Value::Array(citations))
    }

    pub fn hidden(self) -> Self {
        self.meta("is_visually_hidden_from_conversation", Value::Bool(true))
    }

    /// Mark as a user system message carrying `about_model` instructions.
    pub fn user_system(self, about_model: &str) -> Self {
        self.meta("is_user_system_message", Value::Bool(true)).meta(
            "user_context_message_data",
            json!({"about_model_message": about_model}),
        )
    }

    pub fn meta(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    fn to_message(&self, id: &str) -> Value {
        let mut message = json!({
            "id": id,
            "author": {"role": self.role},
            "content": self.content,
            "metadata": self.metadata,
        });
        if let Some(create_time) = self.create_time {
            message["create_time"] = json!(create_time);
        }
        message
    }
}

fn text_content(text: &str) -> Value {
    json!({"content_type": "text", "parts": [text]})
}

/// Builds one conversation as an empty root followed by a first-child chain.
#[derive(Debug, Clone)]
pub struct ExportBuilder {
    title: Option<String>,
    create_time: f64,
    update_time: f64,
    chain: Vec<NodeSpec>,
    branches: Vec<(usize, NodeSpec)>,
}

impl ExportBuilder {
    pub fn new(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            create_time: 1_700_000_000.0,
            update_time: 1_700_000_000.0,
            chain: Vec::new(),
            branches: Vec::new(),
        }
    }

    pub fn untitled() -> Self {
        Self {
            title: None,
            ..Self::new("")
        }
    }

    pub fn times(mut self, create_time: f64, update_time: f64) -> Self {
        self.create_time = create_time;
        self.update_time = update_time;
        self
    }

    pub fn node(mut self, spec: NodeSpec) -> Self {
        self.chain.push(spec);
        self
    }

    /// Add an alternate child after the most recent chain node.
    pub fn branch(mut self, spec: NodeSpec) -> Self {
        self.branches.push((self.chain.len(), spec));
        self
    }

    pub fn build(&self) -> Value {
        let mut mapping = Map::new();
        let chain_ids: Vec<String> = (0..self.chain.len()).map(|i| format!("node-{i}")).collect();

        let mut children: Vec<Vec<String>> = vec![Vec::new(); self.chain.len() + 1];
        for (position, id) in chain_ids.iter().enumerate() {
            children[position].push(id.clone());
        }
        for (index, (position, _)) in self.branches.iter().enumerate() {
            children[*position].push(format!("branch-{index}"));
        }

        mapping.insert(
            "root".to_string(),
            json!({"id": "root", "message": null, "parent": null, "children": children[0]}),
        );
        for (position, spec) in self.chain.iter().enumerate() {
            let id = &chain_ids[position];
            let parent = if position == 0 {
                "root".to_string()
            } else {
                chain_ids[position - 1].clone()
            };
            mapping.insert(
                id.clone(),
                json!({
                    "id": id,
                    "message": spec.to_message(&format!("msg-{position}")),
                    "parent": parent,
                    "children": children[position + 1],
                }),
            );
        }
        for (index, (position, spec)) in self.branches.iter().enumerate() {
            let id = format!("branch-{index}");
            let parent = if *position == 0 {
                "root".to_string()
            } else {
                chain_ids[position - 1].clone()
            };
            mapping.insert(
                id.clone(),
                json!({
                    "id": id,
                    "message": spec.to_message(&format!("branch-msg-{index}")),
                    "parent": parent,
                    "children": [],
                }),
            );
        }

        let mut conversation = json!({
            "create_time": self.create_time,
            "update_time": self.update_time,
            "mapping": mapping,
        });
        if let Some(title) = self.title.as_ref() {
            conversation["title"] = json!(title);
        }
        conversation
    }

    /// Whole export: a JSON array of conversations.
    pub fn archive(conversations: &[ExportBuilder]) -> Value {
        Value::Array(conversations.iter().map(ExportBuilder::build).collect())
    }
}
