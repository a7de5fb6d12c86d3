/// News and politics boards polled by the fetcher, in query order.
pub const TARGET_BOARDS: &[&str] = &[
    "news",
    "worldnews",
    "politics",
    "geopolitics",
    "neutralnews",
    "worldpolitics",
    "internationalnews",
    "moderatepolitics",
    "politicaldiscussion",
    "anime_titties",
];

/// Ordered, lowercased list of boards the pipeline accepts posts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetBoards {
    names: Vec<String>,
}

impl TargetBoards {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim().to_lowercase();
            if !name.is_empty() && !out.contains(&name) {
                out.push(name);
            }
        }
        Self { names: out }
    }

    /// Case-insensitive membership check.
    pub fn contains(&self, board: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(board))
    }

    /// Multi-board path segment: `news+worldnews+...`.
    pub fn query(&self) -> String {
        self.names.join("+")
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for TargetBoards {
    fn default() -> Self {
        Self::new(TARGET_BOARDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_ignores_case() {
        let boards = TargetBoards::default();
        assert!(boards.contains("WorldNews"));
        assert!(boards.contains("anime_titties"));
        assert!(!boards.contains("aww"));
    }

    #[test]
    fn query_joins_in_order() {
        let boards = TargetBoards::new(["News", "politics", "news"]);
        assert_eq!(boards.len(), 2);
        assert_eq!(boards.query(), "news+politics");
    }
}
