// src/environment.rs

//! Environment resolution and placeholder substitution
//!
//! A run resolves one `Environment` up front; each formula then gets a
//! `Bindings` table whose `{prefix}` is namespaced by the formula name.
//! Resolution is pure: it never reads or creates anything on disk.
//!
//! # Placeholder syntax
//!
//! - `{prefix}`, `{sysconfdir}`, `{mandir}` are substituted
//! - `{{` and `}}` produce literal braces
//! - `${...}` is shell parameter expansion and is copied untouched
//! - brace groups that are not a bare identifier (`{a,b}`, `{ cmd; }`) are
//!   copied untouched
//! - any other `{identifier}` is an `UnresolvedVariable` error

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Placeholders recognized in command templates
pub const PLACEHOLDERS: [&str; 3] = ["prefix", "sysconfdir", "mandir"];

/// Operator-supplied environment settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentOverrides {
    /// Root under which every formula gets its own prefix
    pub prefix_root: PathBuf,
    /// Shared configuration root (default: `<prefix_root>/etc`)
    pub sysconfdir: Option<PathBuf>,
    /// Manual-page root (default: `<prefix_root>/share/man`)
    pub mandir: Option<PathBuf>,
}

impl EnvironmentOverrides {
    pub fn new(prefix_root: impl Into<PathBuf>) -> Self {
        Self {
            prefix_root: prefix_root.into(),
            sysconfdir: None,
            mandir: None,
        }
    }
}

/// Paths resolved once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    prefix_root: PathBuf,
    config_dir: PathBuf,
    man_dir: PathBuf,
}

impl Environment {
    /// Resolve overrides into absolute paths
    pub fn resolve(overrides: &EnvironmentOverrides) -> Result<Self> {
        let prefix_root = require_absolute("prefix root", &overrides.prefix_root)?;

        let config_dir = match &overrides.sysconfdir {
            Some(dir) => require_absolute("sysconfdir", dir)?,
            None => prefix_root.join("etc"),
        };
        let man_dir = match &overrides.mandir {
            Some(dir) => require_absolute("mandir", dir)?,
            None => prefix_root.join("share").join("man"),
        };

        Ok(Self {
            prefix_root,
            config_dir,
            man_dir,
        })
    }

    pub fn prefix_root(&self) -> &Path {
        &self.prefix_root
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn man_dir(&self) -> &Path {
        &self.man_dir
    }

    /// Install prefix owned by a single formula
    pub fn prefix_for(&self, name: &str) -> PathBuf {
        self.prefix_root.join(name)
    }

    /// Bindings table for one formula
    pub fn bindings(&self, name: &str) -> Bindings {
        Bindings {
            prefix: self.prefix_for(name),
            sysconfdir: self.config_dir.clone(),
            mandir: self.man_dir.clone(),
        }
    }
}

fn require_absolute(what: &str, path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Err(Error::InvalidPath(format!(
            "{} must be absolute: {}",
            what,
            path.display()
        )))
    }
}

/// Placeholder values for one formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bindings {
    pub prefix: PathBuf,
    pub sysconfdir: PathBuf,
    pub mandir: PathBuf,
}

impl Bindings {
    /// Look up a placeholder by name
    pub fn get(&self, placeholder: &str) -> Option<&Path> {
        match placeholder {
            "prefix" => Some(&self.prefix),
            "sysconfdir" => Some(&self.sysconfdir),
            "mandir" => Some(&self.mandir),
            _ => None,
        }
    }

    /// Directories the install stage may write into
    pub fn directories(&self) -> [&Path; 3] {
        [&self.prefix, &self.sysconfdir, &self.mandir]
    }

    /// Substitute every placeholder in a command template
    pub fn substitute(&self, template: &str) -> Result<String> {
        expand(template, |name| {
            self.get(name).map(|p| p.to_string_lossy().into_owned())
        })
    }
}

/// Check that a template only uses recognized placeholders
pub fn check_template(template: &str) -> Result<()> {
    expand(template, |name| {
        PLACEHOLDERS.contains(&name).then(String::new)
    })
    .map(|_| ())
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn expand(template: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '$' if matches!(chars.peek(), Some((_, '{'))) => {
                // Shell parameter expansion: copy through the closing brace
                out.push('$');
                for (_, c) in chars.by_ref() {
                    out.push(c);
                    if c == '}' {
                        break;
                    }
                }
            }
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let rest = &template[i + 1..];
                let ident_len = rest.find(|c: char| !is_ident(c)).unwrap_or(rest.len());

                if ident_len > 0 && rest[ident_len..].starts_with('}') {
                    let name = &rest[..ident_len];
                    let value = lookup(name).ok_or_else(|| Error::UnresolvedVariable {
                        placeholder: name.to_string(),
                        command: template.to_string(),
                    })?;
                    out.push_str(&value);
                    // Skip the identifier and the closing brace
                    for _ in 0..=ident_len {
                        chars.next();
                    }
                } else {
                    out.push('{');
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::resolve(&EnvironmentOverrides::new("/opt/pkg")).unwrap()
    }

    #[test]
    fn test_defaults() {
        let env = env();
        assert_eq!(env.config_dir(), Path::new("/opt/pkg/etc"));
        assert_eq!(env.man_dir(), Path::new("/opt/pkg/share/man"));
        assert_eq!(env.prefix_for("C"), PathBuf::from("/opt/pkg/C"));
    }

    #[test]
    fn test_overrides() {
        let overrides = EnvironmentOverrides {
            prefix_root: PathBuf::from("/opt/pkg"),
            sysconfdir: Some(PathBuf::from("/etc")),
            mandir: Some(PathBuf::from("/usr/share/man")),
        };
        let env = Environment::resolve(&overrides).unwrap();
        let bindings = env.bindings("muon");
        assert_eq!(bindings.prefix, PathBuf::from("/opt/pkg/muon"));
        assert_eq!(bindings.sysconfdir, PathBuf::from("/etc"));
        assert_eq!(bindings.mandir, PathBuf::from("/usr/share/man"));
    }

    #[test]
    fn test_relative_paths_rejected() {
        let result = Environment::resolve(&EnvironmentOverrides::new("opt/pkg"));
        assert!(matches!(result, Err(Error::InvalidPath(_))));

        let overrides = EnvironmentOverrides {
            sysconfdir: Some(PathBuf::from("etc")),
            ..EnvironmentOverrides::new("/opt/pkg")
        };
        assert!(matches!(
            Environment::resolve(&overrides),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_resolution_is_pure() {
        let overrides = EnvironmentOverrides::new("/nonexistent/root");
        let a = Environment::resolve(&overrides).unwrap();
        let b = Environment::resolve(&overrides).unwrap();
        assert_eq!(a, b);
        assert!(!Path::new("/nonexistent/root").exists());
    }

    #[test]
    fn test_substitute_all_placeholders() {
        let bindings = env().bindings("muon");
        let cmd = bindings
            .substitute("./configure --prefix={prefix} --sysconfdir={sysconfdir} --mandir={mandir}")
            .unwrap();
        assert_eq!(
            cmd,
            "./configure --prefix=/opt/pkg/muon --sysconfdir=/opt/pkg/etc --mandir=/opt/pkg/share/man"
        );
        assert!(!cmd.contains('{'));
        assert!(!cmd.contains('}'));
    }

    #[test]
    fn test_unknown_placeholder() {
        let bindings = env().bindings("muon");
        let err = bindings.substitute("cp foo {libdir}/").unwrap_err();
        match err {
            Error::UnresolvedVariable { placeholder, command } => {
                assert_eq!(placeholder, "libdir");
                assert_eq!(command, "cp foo {libdir}/");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shell_syntax_passes_through() {
        let bindings = env().bindings("x");
        assert_eq!(
            bindings.substitute("echo ${HOME} {a,b} { true; }").unwrap(),
            "echo ${HOME} {a,b} { true; }"
        );
        assert_eq!(bindings.substitute("echo {{prefix}}").unwrap(), "echo {prefix}");
    }

    #[test]
    fn test_check_template() {
        assert!(check_template("make install PREFIX={prefix}").is_ok());
        assert!(check_template("make {bogus}").is_err());
    }
}
