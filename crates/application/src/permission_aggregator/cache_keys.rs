use gatehouse_core::RoleId;
use gatehouse_domain::AssignmentScope;

/// Builds the cache key layout shared by aggregation and invalidation.
///
/// ```text
/// {prefix}:role:{role_id}
/// {prefix}:user:{user_id}:all
/// {prefix}:user:{user_id}:{scope}:*
/// {prefix}:user:{user_id}:{scope}:{scope_id}
/// ```
///
/// Every entry is guarded by generation keys under `{prefix}:gen:`. A role
/// set is guarded by `gen:role:{role_id}`; a user query by both
/// `gen:user:{user_id}` and the `gen:` twin of its own key.
///
/// User and scope ids are percent-escaped so they can never introduce a
/// separator or a wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    prefix: String,
}

impl CacheKeys {
    /// Creates a key builder for a namespace.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Key of one role's aggregated permission set.
    #[must_use]
    pub fn role(&self, role_id: RoleId) -> String {
        format!("{}:role:{role_id}", self.prefix)
    }

    /// Key of one user permission query. A scope id without a scope is ignored.
    #[must_use]
    pub fn user(
        &self,
        user_id: &str,
        scope: Option<AssignmentScope>,
        scope_id: Option<&str>,
    ) -> String {
        format!("{}:{}", self.prefix, user_query(user_id, scope, scope_id))
    }

    /// Prefix covering every cached query of one user.
    #[must_use]
    pub fn user_prefix(&self, user_id: &str) -> String {
        format!("{}:user:{}:", self.prefix, escape_segment(user_id))
    }

    /// Generation key guarding one role's aggregated set.
    #[must_use]
    pub fn role_generation(&self, role_id: RoleId) -> String {
        format!("{}:gen:role:{role_id}", self.prefix)
    }

    /// Generation key guarding every cached query of one user.
    #[must_use]
    pub fn user_generation(&self, user_id: &str) -> String {
        format!("{}:gen:user:{}", self.prefix, escape_segment(user_id))
    }

    /// Generation key guarding a single cached user query.
    #[must_use]
    pub fn query_generation(
        &self,
        user_id: &str,
        scope: Option<AssignmentScope>,
        scope_id: Option<&str>,
    ) -> String {
        format!("{}:gen:{}", self.prefix, user_query(user_id, scope, scope_id))
    }
}

fn user_query(user_id: &str, scope: Option<AssignmentScope>, scope_id: Option<&str>) -> String {
    let user = escape_segment(user_id);
    match (scope, scope_id) {
        (None, _) => format!("user:{user}:all"),
        (Some(scope), None) => format!("user:{user}:{scope}:*"),
        (Some(scope), Some(scope_id)) => {
            format!("user:{user}:{scope}:{}", escape_segment(scope_id))
        }
    }
}

fn escape_segment(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        match character {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            '*' => escaped.push_str("%2A"),
            other => escaped.push(other),
        }
    }
    escaped
}
