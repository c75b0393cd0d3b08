use chrono::Utc;
use rocket::{serde::json::Json, Route};

use crate::{
    error::Result,
    model::{
        api::candidate::{CandidateList, CandidateView},
        db::candidate::Candidate,
        mongodb::Coll,
    },
};

pub fn routes() -> Vec<Route> {
    routes![candidates]
}

#[get("/candidates")]
async fn candidates(candidates: Coll<Candidate>) -> Result<Json<CandidateList>> {
    let version = Utc::now().timestamp_millis();
    let candidates = Candidate::all(&candidates)
        .await?
        .into_iter()
        .map(|candidate| CandidateView::new(candidate, version))
        .collect();
    Ok(Json(CandidateList {
        success: true,
        candidates,
    }))
}
