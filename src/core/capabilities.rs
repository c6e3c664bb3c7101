//! Registry of installable capability servers surfaced in the side panel.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone)]
pub struct CapabilityServer {
    pub name: String,
    pub description: String,
    pub repo: String,
    pub installed: bool,
    pub running: bool,
}

impl CapabilityServer {
    fn new(name: &str, description: &str, repo: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            repo: repo.to_string(),
            installed: false,
            running: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    MissingFields,
    DuplicateName,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::MissingFields => write!(f, "Name and description are required."),
            RegistryError::DuplicateName => {
                write!(f, "A server with this name already exists.")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

pub struct CapabilityRegistry {
    order: Vec<String>,
    servers: HashMap<String, CapabilityServer>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        let builtins = [
            (
                "web-search",
                CapabilityServer::new(
                    "Web Search",
                    "Enables the model to search the web using various search engines.",
                    "https://github.com/mcp-ai/web-search-mcp-server",
                ),
            ),
            (
                "code-interpreter",
                CapabilityServer::new(
                    "Code Interpreter",
                    "A Node.js code interpreter for executing code.",
                    "https://github.com/mcp-ai/node-code-interpreter-mcp-server",
                ),
            ),
            (
                "time",
                CapabilityServer::new(
                    "Time",
                    "Provides time and timezone conversion capabilities.",
                    "https://github.com/model-context-protocol/time",
                ),
            ),
            (
                "puppeteer",
                CapabilityServer::new(
                    "Puppeteer",
                    "Browser automation and web scraping.",
                    "https://github.com/model-context-protocol/puppeteer",
                ),
            ),
            (
                "serper-mcp-server",
                CapabilityServer::new(
                    "Serper Search",
                    "A Google Search API connector via serper.dev.",
                    "https://github.com/garymeng/serper-mcp-server",
                ),
            ),
        ];

        let mut order = Vec::new();
        let mut servers = HashMap::new();
        for (key, server) in builtins {
            order.push(key.to_string());
            servers.insert(key.to_string(), server);
        }
        Self { order, servers }
    }

    pub fn keys(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn get(&self, key: &str) -> Option<&CapabilityServer> {
        self.servers.get(key)
    }

    /// Mark an existing server installed. Unknown keys are ignored.
    pub fn install(&mut self, key: &str) {
        if let Some(server) = self.servers.get_mut(key) {
            server.installed = true;
        }
    }

    /// Flip the running flag. Only installed servers can start.
    pub fn toggle_running(&mut self, key: &str) {
        if let Some(server) = self.servers.get_mut(key) {
            if server.installed {
                server.running = !server.running;
            }
        }
    }

    /// Register a custom server. The key is a slug of the display name
    /// (lowercased, spaces become dashes). Returns the new key.
    pub fn add_custom(
        &mut self,
        name: &str,
        description: &str,
        repo: &str,
    ) -> Result<String, RegistryError> {
        if name.is_empty() || description.is_empty() {
            return Err(RegistryError::MissingFields);
        }
        let key = name.to_lowercase().replace(' ', "-");
        if self.servers.contains_key(&key) {
            return Err(RegistryError::DuplicateName);
        }
        self.order.push(key.clone());
        self.servers
            .insert(key.clone(), CapabilityServer::new(name, description, repo));
        Ok(key)
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
