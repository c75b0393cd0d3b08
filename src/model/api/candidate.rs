use serde::{Deserialize, Serialize};

use crate::model::db::candidate::Candidate;

/// A candidate as shown on the ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateView {
    pub id: u32,
    pub name: String,
    pub class_name: String,
    pub photo: Option<String>,
}

impl CandidateView {
    /// Tag the photo URL with `version` so browsers refetch it.
    pub fn new(candidate: Candidate, version: i64) -> Self {
        let photo = candidate.photo.map(|photo| {
            let separator = if photo.contains('?') { '&' } else { '?' };
            format!("{photo}{separator}v={version}")
        });
        Self {
            id: candidate.id,
            name: candidate.name,
            class_name: candidate.class_name,
            photo,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateList {
    pub success: bool,
    pub candidates: Vec<CandidateView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_is_cache_busted() {
        let view = CandidateView::new(Candidate::example1(), 1700);
        assert_eq!(view.photo.as_deref(), Some("/assets/p1.png?v=1700"));

        let mut candidate = Candidate::example2();
        candidate.photo = Some("/assets/p2.png?size=large".to_string());
        let view = CandidateView::new(candidate, 1700);
        assert_eq!(
            view.photo.as_deref(),
            Some("/assets/p2.png?size=large&v=1700")
        );

        candidate = Candidate::example2();
        candidate.photo = None;
        assert_eq!(CandidateView::new(candidate, 1).photo, None);
    }
}
