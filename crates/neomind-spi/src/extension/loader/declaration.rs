//! Declaration line parsing.
//!
//! Each non-blank line is `names=class` or a bare `class`, with `#` starting
//! a comment. `names` may list several comma-separated names.

use crate::extension::types::simple_name;

/// One parsed declaration line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// The comment-stripped, trimmed line.
    pub line: String,
    /// Declared names; empty for a bare class.
    pub names: Vec<String>,
    pub class: String,
}

/// Parse a single line. `None` for blank and comment-only lines.
pub fn parse_line(raw: &str) -> Option<Declaration> {
    let line = raw.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return None;
    }

    let (names, class) = match line.split_once('=') {
        Some((names, class)) => (split_names(names), class.trim()),
        None => (Vec::new(), line),
    };

    Some(Declaration {
        line: line.to_string(),
        names,
        class: class.to_string(),
    })
}

/// Parse a whole resource.
pub fn parse(content: &str) -> Vec<Declaration> {
    content.lines().filter_map(parse_line).collect()
}

/// Split a comma-separated name list, dropping empty entries.
pub fn split_names(names: &str) -> Vec<String> {
    names
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// Name of a bare declaration: the class simple name without the extension
/// point's simple name as suffix, lowercased.
///
/// `neomind.rpc.HttpProtocol` for `neomind.rpc.Protocol` yields `http`.
pub fn derive_name(class: &str, extension_point: &str) -> String {
    let class_name = simple_name(class);
    let suffix = simple_name(extension_point);
    class_name
        .strip_suffix(suffix)
        .unwrap_or(class_name)
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_line() {
        let decl = parse_line("  http = neomind.rpc.HttpProtocol  # primary").unwrap();
        assert_eq!(decl.names, vec!["http"]);
        assert_eq!(decl.class, "neomind.rpc.HttpProtocol");
        assert_eq!(decl.line, "http = neomind.rpc.HttpProtocol");
    }

    #[test]
    fn test_parse_multiple_names() {
        let decl = parse_line("http, https ,=neomind.rpc.HttpProtocol").unwrap();
        assert_eq!(decl.names, vec!["http", "https"]);
    }

    #[test]
    fn test_parse_bare_class() {
        let decl = parse_line("neomind.rpc.GrpcProtocol").unwrap();
        assert!(decl.names.is_empty());
        assert_eq!(decl.class, "neomind.rpc.GrpcProtocol");
    }

    #[test]
    fn test_skips_blank_and_comments() {
        let content = "# header\n\n   \nhttp=a.Http\n#grpc=a.Grpc\n";
        let decls = parse(content);
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].class, "a.Http");
    }

    #[test]
    fn test_derive_name() {
        assert_eq!(derive_name("neomind.rpc.HttpProtocol", "neomind.rpc.Protocol"), "http");
        assert_eq!(derive_name("neomind.rpc.Mio", "neomind.rpc.Transporter"), "mio");
        assert_eq!(derive_name("Protocol", "neomind.rpc.Protocol"), "");
    }
}
