/// One segment of a compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `:name`, matches any single request segment.
    Param,
}

/// A route path pattern split on `/`, compiled once at registration.
///
/// Matching requires the same segment count; there are no wildcards that
/// span several segments, so `/a/:id` matches neither `/a` nor `/a/1/b`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .map(|s| match s.strip_prefix(':') {
                Some(_) => Segment::Param,
                None => Segment::Literal(s.to_string()),
            })
            .collect();
        Self { segments }
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = strip_query(path);
        let mut req = path.split('/');
        for seg in &self.segments {
            let Some(part) = req.next() else {
                return false;
            };
            match seg {
                Segment::Param => {}
                Segment::Literal(lit) => {
                    if lit != part {
                        return false;
                    }
                }
            }
        }
        req.next().is_none()
    }
}

/// `*` on the route matches any request method.
pub fn method_matches(route_method: &str, method: &str) -> bool {
    route_method == "*" || route_method.eq_ignore_ascii_case(method)
}

fn strip_query(path: &str) -> &str {
    match path.find('?') {
        Some(idx) => &path[..idx],
        None => path,
    }
}
