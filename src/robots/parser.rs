//! Robots.txt rules
//!
//! Thin wrapper around the robotstxt crate's matcher.

use robotstxt::DefaultMatcher;

/// Rules from one host's robots.txt
#[derive(Debug, Clone)]
pub struct RobotRules {
    /// Raw robots.txt body (empty means allow all)
    body: String,
    /// Skip matching entirely
    allow_all: bool,
}

impl RobotRules {
    /// Wraps the body of a successfully fetched robots.txt
    pub fn from_body(body: &str) -> Self {
        Self {
            body: body.to_string(),
            allow_all: false,
        }
    }

    /// Rules that allow everything
    ///
    /// Used when robots.txt is missing, unreachable or answered with an error.
    pub fn allow_all() -> Self {
        Self {
            body: String::new(),
            allow_all: true,
        }
    }

    pub fn is_allow_all(&self) -> bool {
        self.allow_all || self.body.trim().is_empty()
    }

    /// Checks whether `url` may be fetched by `user_agent`
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL or path (e.g., "/page.html")
    /// * `user_agent` - The robots.txt user agent token
    pub fn allows(&self, url: &str, user_agent: &str) -> bool {
        if self.is_allow_all() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.body, user_agent, url)
    }
}
