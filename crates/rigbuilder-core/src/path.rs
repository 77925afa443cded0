//! # Attribute Paths
//!
//! Parsing of `/`-delimited attribute paths such as `/arm/ik/blend`,
//! `../scale` or `./x`. Every segment but the last names a module to
//! descend into (`..` ascends, `.` and empty segments are skipped); the last
//! segment names an attribute.

/// One module step of an attribute path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// `..`
    Parent,
    /// A child module name.
    Child(&'a str),
}

/// A parsed attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePath<'a> {
    pub modules: Vec<Segment<'a>>,
    pub attribute: &'a str,
}

impl<'a> AttributePath<'a> {
    #[must_use]
    pub fn parse(path: &'a str) -> Self {
        let mut parts: Vec<&str> = path.split('/').collect();
        let attribute = parts.pop().unwrap_or_default();
        let modules = parts
            .into_iter()
            .filter_map(|part| match part {
                "" | "." => None,
                ".." => Some(Segment::Parent),
                name => Some(Segment::Child(name)),
            })
            .collect();
        Self { modules, attribute }
    }
}

/// Whether a connection leaves the subtree being saved.
///
/// `parent_depth` is the depth of the connecting attribute's parent module
/// below the saved module (`Some(0)` when the parent is the saved module
/// itself), or `None` when the connecting module is the saved module, whose
/// parent is always outside. Any step that climbs above the saved module
/// counts as leaving it, even if later steps would come back in.
#[must_use]
pub fn escapes_subtree(connect: &str, parent_depth: Option<usize>) -> bool {
    let Some(mut depth) = parent_depth else {
        return !connect.is_empty();
    };
    for segment in AttributePath::parse(connect).modules {
        match segment {
            Segment::Parent => {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            Segment::Child(_) => depth += 1,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modules_and_attribute() {
        let p = AttributePath::parse("/arm/../leg/./ik/blend");
        assert_eq!(
            p.modules,
            vec![
                Segment::Child("arm"),
                Segment::Parent,
                Segment::Child("leg"),
                Segment::Child("ik"),
            ]
        );
        assert_eq!(p.attribute, "blend");
    }

    #[test]
    fn bare_attribute_has_no_module_steps() {
        let p = AttributePath::parse("/attr");
        assert!(p.modules.is_empty());
        assert_eq!(p.attribute, "attr");
        assert_eq!(AttributePath::parse("attr"), p);
    }

    #[test]
    fn trailing_slash_names_empty_attribute() {
        assert_eq!(AttributePath::parse("/a/").attribute, "");
    }

    #[test]
    fn saved_module_connections_always_escape() {
        assert!(escapes_subtree("/sibling/x", None));
        assert!(!escapes_subtree("", None));
    }

    #[test]
    fn child_connections_inside_subtree_are_kept() {
        assert!(!escapes_subtree("/other_child/x", Some(0)));
        assert!(!escapes_subtree("../x", Some(1)));
        assert!(escapes_subtree("../x", Some(0)));
        assert!(escapes_subtree("../../a/x", Some(1)));
    }
}
