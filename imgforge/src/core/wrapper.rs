//! Command wrappers: pure rewrites applied to a command line before it runs.
//!
//! A wrapper lets a higher layer change where or how a command executes
//! (environment, privilege, confinement) without knowing the command. Wrappers
//! compose with [`Chain`].

use std::sync::LazyLock;

use minijinja::{Environment, UndefinedBehavior, context};
use regex::Regex;

use crate::error::BackendError;

/// Rewrites a command line. Returning an error means the command cannot be
/// represented in the wrapper's target context.
pub trait CommandWrapper: Send + Sync {
    fn wrap(&self, command: &str) -> Result<String, BackendError>;
}

impl<F> CommandWrapper for F
where
    F: Fn(&str) -> Result<String, BackendError> + Send + Sync,
{
    fn wrap(&self, command: &str) -> Result<String, BackendError> {
        self(command)
    }
}

/// Leaves the command untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl CommandWrapper for Identity {
    fn wrap(&self, command: &str) -> Result<String, BackendError> {
        Ok(command.to_string())
    }
}

/// Prefixes `KEY='value'` assignments so the command sees extra environment.
#[derive(Debug, Clone, Default)]
pub struct EnvPrefix {
    vars: Vec<(String, String)>,
}

static ENV_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("env name regex"));

impl EnvPrefix {
    pub fn new<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl CommandWrapper for EnvPrefix {
    fn wrap(&self, command: &str) -> Result<String, BackendError> {
        let mut out = String::new();
        for (key, value) in &self.vars {
            if !ENV_NAME_RE.is_match(key) {
                return Err(BackendError::CommandRejected(format!(
                    "invalid environment variable name '{key}'"
                )));
            }
            out.push_str(key);
            out.push('=');
            out.push_str(&quote(value));
            out.push(' ');
        }
        out.push_str(command);
        Ok(out)
    }
}

/// Renders a user-supplied template such as `sudo {{ command }}`.
///
/// The template must reference `command`; unknown variables are an error.
pub struct TemplateWrapper {
    env: Environment<'static>,
    template: String,
}

impl TemplateWrapper {
    pub fn new(template: &str) -> Result<Self, BackendError> {
        if !template.contains("command") {
            return Err(BackendError::CommandRejected(format!(
                "wrapper template '{template}' does not reference {{{{ command }}}}"
            )));
        }
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.template_from_str(template).map_err(|err| {
            BackendError::CommandRejected(format!("parse wrapper template: {err}"))
        })?;
        Ok(Self {
            env,
            template: template.to_string(),
        })
    }
}

impl CommandWrapper for TemplateWrapper {
    fn wrap(&self, command: &str) -> Result<String, BackendError> {
        self.env
            .render_str(&self.template, context! { command => command })
            .map_err(|err| BackendError::CommandRejected(format!("render wrapper template: {err}")))
    }
}

/// Applies wrappers in order; the first failure aborts the chain.
#[derive(Default)]
pub struct Chain {
    wrappers: Vec<Box<dyn CommandWrapper>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, wrapper: impl CommandWrapper + 'static) -> Self {
        self.wrappers.push(Box::new(wrapper));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }
}

impl CommandWrapper for Chain {
    fn wrap(&self, command: &str) -> Result<String, BackendError> {
        let mut current = command.to_string();
        for wrapper in &self.wrappers {
            current = wrapper.wrap(&current)?;
        }
        Ok(current)
    }
}

/// Quote `s` as a single POSIX shell word.
///
/// Single quotes suppress every expansion; embedded single quotes are closed,
/// escaped, and reopened.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_handles_embedded_single_quotes() {
        assert_eq!(quote("echo hi"), "'echo hi'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote("$HOME"), "'$HOME'");
    }

    #[test]
    fn env_prefix_quotes_values() {
        let wrapper = EnvPrefix::new([("LANG", "C"), ("GREETING", "hello world")]);
        assert_eq!(
            wrapper.wrap("make").expect("wrap"),
            "LANG='C' GREETING='hello world' make"
        );
    }

    #[test]
    fn env_prefix_rejects_invalid_names() {
        let wrapper = EnvPrefix::new([("BAD NAME", "x")]);
        let err = wrapper.wrap("true").unwrap_err();
        assert!(matches!(err, BackendError::CommandRejected(_)));
    }

    #[test]
    fn template_wrapper_renders_command() {
        let wrapper = TemplateWrapper::new("sudo -E {{ command }}").expect("template");
        assert_eq!(wrapper.wrap("ls /").expect("wrap"), "sudo -E ls /");
    }

    #[test]
    fn template_wrapper_requires_command_variable() {
        assert!(TemplateWrapper::new("sudo").is_err());
    }

    #[test]
    fn chain_applies_in_order_and_stops_on_failure() {
        let chain = Chain::new()
            .then(EnvPrefix::new([("A", "1")]))
            .then(|cmd: &str| Ok::<_, BackendError>(format!("sudo {cmd}")));
        assert_eq!(chain.wrap("env").expect("wrap"), "sudo A='1' env");

        let failing = Chain::new()
            .then(|_: &str| Err::<String, _>(BackendError::CommandRejected("nope".to_string())))
            .then(Identity);
        assert!(failing.wrap("env").is_err());
    }
}
