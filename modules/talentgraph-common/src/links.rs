use serde::{Deserialize, Serialize};

/// A typed link attached to a person. Each kind has a fixed field set so that
/// every reader and writer agrees on the shape of a given link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkType {
    /// Homepage, lab page, company bio.
    Official { url: String },
    Social {
        platform: String,
        handle: String,
        url: String,
    },
    Paper {
        title: String,
        url: String,
        venue: Option<String>,
    },
    Repository { url: String, stars: Option<u64> },
    Video {
        title: String,
        url: String,
        channel: Option<String>,
    },
    Article {
        title: String,
        url: String,
        outlet: Option<String>,
    },
}

impl LinkType {
    pub fn url(&self) -> &str {
        match self {
            LinkType::Official { url }
            | LinkType::Social { url, .. }
            | LinkType::Paper { url, .. }
            | LinkType::Repository { url, .. }
            | LinkType::Video { url, .. }
            | LinkType::Article { url, .. } => url,
        }
    }

    /// Human-readable title; kinds without one fall back to the url or handle.
    pub fn title(&self) -> &str {
        match self {
            LinkType::Paper { title, .. }
            | LinkType::Video { title, .. }
            | LinkType::Article { title, .. } => title,
            LinkType::Social { handle, .. } => handle,
            LinkType::Official { url } | LinkType::Repository { url, .. } => url,
        }
    }

    /// Short source-type label used in audit reports.
    pub fn source_type(&self) -> &'static str {
        match self {
            LinkType::Official { .. } => "official",
            LinkType::Social { .. } => "social",
            LinkType::Paper { .. } => "paper",
            LinkType::Repository { .. } => "repository",
            LinkType::Video { .. } => "video",
            LinkType::Article { .. } => "article",
        }
    }

    /// Popularity carried by the link itself (repository stars).
    pub fn popularity(&self) -> u64 {
        match self {
            LinkType::Repository { stars, .. } => stars.unwrap_or(0),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_kind_tag() {
        let link = LinkType::Social {
            platform: "x".to_string(),
            handle: "@karpathy".to_string(),
            url: "https://x.com/karpathy".to_string(),
        };
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(json["kind"], "social");
        assert_eq!(json["handle"], "@karpathy");
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = serde_json::from_str::<LinkType>(r#"{"kind":"blog","url":"https://a.b"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn accessors_per_variant() {
        let repo = LinkType::Repository {
            url: "https://github.com/openai/gpt-2".to_string(),
            stars: Some(21000),
        };
        assert_eq!(repo.source_type(), "repository");
        assert_eq!(repo.title(), "https://github.com/openai/gpt-2");
        assert_eq!(repo.popularity(), 21000);

        let paper = LinkType::Paper {
            title: "Attention Is All You Need".to_string(),
            url: "https://arxiv.org/abs/1706.03762".to_string(),
            venue: Some("NeurIPS".to_string()),
        };
        assert_eq!(paper.title(), "Attention Is All You Need");
        assert_eq!(paper.url(), "https://arxiv.org/abs/1706.03762");
        assert_eq!(paper.popularity(), 0);
    }
}
