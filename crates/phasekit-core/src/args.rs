//! Command-line style configuration.
//!
//! The engine consumes pre-split `+KEY=value` strings through the narrow
//! [`ConfigSource`] interface: all values for a key prefix, and all
//! arguments matching a glob.

use phasekit_factory::wildcard::is_match;

/// Source of command-line style arguments.
pub trait ConfigSource {
    /// Every argument, in order.
    fn args(&self) -> &[String];

    /// Values of every argument starting with `prefix`, with the prefix
    /// removed (e.g. `arg_values("+TESTNAME=")`).
    fn arg_values(&self, prefix: &str) -> Vec<String> {
        self.args()
            .iter()
            .filter_map(|arg| arg.strip_prefix(prefix))
            .map(str::to_owned)
            .collect()
    }

    /// Every argument matching the glob `pattern`.
    fn arg_matches(&self, pattern: &str) -> Vec<String> {
        self.args()
            .iter()
            .filter(|arg| is_match(pattern, arg))
            .cloned()
            .collect()
    }
}

/// A [`ConfigSource`] over a list of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgsSource {
    args: Vec<String>,
}

impl ArgsSource {
    /// Wrap a list of arguments.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Append more arguments; later arguments come after earlier ones.
    #[must_use]
    pub fn with_args<I, S>(mut self, more: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(more.into_iter().map(Into::into));
        self
    }
}

impl ConfigSource for ArgsSource {
    fn args(&self) -> &[String] {
        &self.args
    }
}

/// A `+set_type_override=` setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TypeOverrideArg {
    pub(crate) original: String,
    pub(crate) override_type: String,
    pub(crate) replace: bool,
}

/// A `+set_inst_override=` setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InstOverrideArg {
    pub(crate) original: String,
    pub(crate) override_type: String,
    pub(crate) path: String,
}

/// Parse `<orig>,<ovrd>[,0|1]`.
pub(crate) fn parse_type_override(value: &str) -> Option<TypeOverrideArg> {
    let parts: Vec<&str> = value.split(',').collect();
    let (original, override_type, replace) = match parts.as_slice() {
        [o, v] => (*o, *v, true),
        [o, v, "1"] => (*o, *v, true),
        [o, v, "0"] => (*o, *v, false),
        _ => return None,
    };
    if original.is_empty() || override_type.is_empty() {
        return None;
    }
    Some(TypeOverrideArg {
        original: original.to_owned(),
        override_type: override_type.to_owned(),
        replace,
    })
}

/// Parse `<orig>,<ovrd>,<path>`.
pub(crate) fn parse_inst_override(value: &str) -> Option<InstOverrideArg> {
    match value.split(',').collect::<Vec<_>>().as_slice() {
        [o, v, p] if !o.is_empty() && !v.is_empty() && !p.is_empty() => Some(InstOverrideArg {
            original: (*o).to_owned(),
            override_type: (*v).to_owned(),
            path: (*p).to_owned(),
        }),
        _ => None,
    }
}

/// Parse `<n>[,YES|NO]`; the flag says whether later settings may
/// override the value.
pub(crate) fn parse_locked_number(value: &str) -> Option<(u64, bool)> {
    let (number, flag) = value.split_once(',').unwrap_or((value, "YES"));
    let number = number.trim().parse().ok()?;
    match flag.trim() {
        "NO" => Some((number, false)),
        _ => Some((number, true)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn source() -> ArgsSource {
        ArgsSource::new([
            "+TESTNAME=smoke",
            "+TESTNAME=other",
            "+PHASE_TRACE",
            "+set_type_override=a,b",
        ])
    }

    #[test]
    fn arg_values_strip_prefix_in_order() {
        assert_eq!(source().arg_values("+TESTNAME="), vec!["smoke", "other"]);
        assert!(source().arg_values("+TIMEOUT=").is_empty());
    }

    #[test]
    fn arg_matches_use_globs() {
        assert_eq!(source().arg_matches("+PHASE_TRACE"), vec!["+PHASE_TRACE"]);
        assert_eq!(source().arg_matches("+set_*_override=*").len(), 1);
    }

    #[test]
    fn with_args_appends() {
        let s = ArgsSource::new(["+A"]).with_args(["+B"]);
        assert_eq!(s.args(), ["+A".to_owned(), "+B".to_owned()]);
    }

    #[test]
    fn type_override_replace_flag() {
        assert!(parse_type_override("a,b").unwrap().replace);
        assert!(!parse_type_override("a,b,0").unwrap().replace);
        assert!(parse_type_override("a,b,2").is_none());
        assert!(parse_type_override("a").is_none());
    }

    #[test]
    fn inst_override_needs_three_fields() {
        let arg = parse_inst_override("a,b,top.*").unwrap();
        assert_eq!(arg.path, "top.*");
        assert!(parse_inst_override("a,b").is_none());
    }

    #[test]
    fn locked_numbers() {
        assert_eq!(parse_locked_number("500"), Some((500, true)));
        assert_eq!(parse_locked_number("500,NO"), Some((500, false)));
        assert_eq!(parse_locked_number("x"), None);
    }
}
