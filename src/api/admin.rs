use mongodb::{Client, Database};
use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    model::{
        api::{
            pagination::Pagination,
            session::AdminSession,
            stats::Stats,
            token::{GenerateRequest, GenerateResponse, TokenPage, TokenRow},
            vote::{VotePage, VoteRow},
        },
        db::{
            generation::generate_tokens,
            settings::end_election,
            token::Token,
            vote::Vote,
        },
        mongodb::Coll,
    },
};

pub fn routes() -> Vec<Route> {
    routes![generate, end_pemira, stats, tokens, votes]
}

#[post("/admin/tokens/generate", data = "<request>")]
async fn generate(
    session: AdminSession,
    request: Option<Json<GenerateRequest>>,
    db_client: &State<Client>,
    db: &State<Database>,
) -> Result<Json<GenerateResponse>> {
    // An empty body asks for a single token.
    let count = request.map(|r| r.count()).unwrap_or(Ok(1))?;
    let generation = generate_tokens(db_client, db, count).await?;
    info!(
        "{} generated {} of {} requested tokens",
        session.email,
        generation.generated.len(),
        generation.requested
    );
    Ok(Json(generation.into()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndResponse {
    pub success: bool,
    pub message: String,
    pub affected_active_tokens: u64,
}

#[post("/admin/end-pemira")]
async fn end_pemira(
    session: AdminSession,
    db_client: &State<Client>,
    db: &State<Database>,
) -> Result<Json<EndResponse>> {
    let closeout = end_election(db_client, db).await?;
    info!(
        "{} ended the election, {} active tokens used up",
        session.email, closeout.affected_active_tokens
    );
    Ok(Json(EndResponse {
        success: true,
        message: "The election has ended. Remaining PINs can no longer be used.".to_string(),
        affected_active_tokens: closeout.affected_active_tokens,
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: Stats,
}

#[get("/admin/stats")]
async fn stats(_session: AdminSession, db: &State<Database>) -> Result<Json<StatsResponse>> {
    Ok(Json(StatsResponse {
        success: true,
        stats: Stats::collect(db).await?,
    }))
}

#[get("/admin/tokens")]
async fn tokens(
    _session: AdminSession,
    pagination: Pagination,
    tokens: Coll<Token>,
) -> Result<Json<TokenPage>> {
    let total = tokens.count_documents(None, None).await?;
    let page = pagination.resolve(total);
    Ok(Json(TokenPage {
        success: true,
        tokens: TokenRow::page(&tokens, &page).await?,
        pagination: page,
    }))
}

#[get("/admin/votes")]
async fn votes(
    _session: AdminSession,
    pagination: Pagination,
    votes: Coll<Vote>,
    db: &State<Database>,
) -> Result<Json<VotePage>> {
    let total = votes.count_documents(None, None).await?;
    let page = pagination.resolve(total);
    Ok(Json(VotePage {
        success: true,
        votes: VoteRow::page(db, &page).await?,
        pagination: page,
    }))
}

#[cfg(test)]
mod tests {
    use mongodb::Client as MongoClient;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::{Client, LocalResponse},
        serde::json::{json, Value},
    };

    use rocket::http::Cookie;

    use super::*;
    use crate::api::catchers::SESSION_INVALID_MESSAGE;
    use crate::model::{
        api::{pin::PinKeys, response::Message, session::ADMIN_SESSION_COOKIE},
        db::{redemption::redeem, token::NewToken},
    };

    async fn post_generate<'c>(client: &'c Client, body: Value) -> LocalResponse<'c> {
        client
            .post(uri!(generate))
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await
    }

    async fn assert_session_invalid(response: LocalResponse<'_>) {
        assert_eq!(Status::Unauthorized, response.status());
        let body: Message = response.into_json().await.unwrap();
        assert!(!body.success);
        assert_eq!(body.message, SESSION_INVALID_MESSAGE);
    }

    #[backend_test]
    async fn admin_routes_need_a_session(client: Client) {
        assert_session_invalid(post_generate(&client, json!({ "count": 5 })).await).await;
        assert_session_invalid(client.post(uri!(end_pemira)).dispatch().await).await;

        for uri in [uri!(stats), uri!(tokens), uri!(votes)] {
            assert_session_invalid(client.get(uri).dispatch().await).await;
        }

        // A cookie that does not verify is no better than none.
        let response = client
            .get(uri!(stats))
            .cookie(Cookie::new(ADMIN_SESSION_COOKIE, "garbage.garbage"))
            .dispatch()
            .await;
        assert_session_invalid(response).await;
    }

    #[backend_test(admin)]
    async fn generate_and_list(client: Client) {
        let response = post_generate(&client, json!({ "count": 12 })).await;
        assert_eq!(Status::Ok, response.status());
        let generated: GenerateResponse = response.into_json().await.unwrap();
        assert_eq!(generated.generated_count, 12);
        assert_eq!(generated.requested_count, 12);
        assert_eq!(generated.generated_tokens_preview.len(), 10);

        // Page size is clamped to 5 and the page to the last one.
        let response = client
            .get("/admin/tokens?page=99&per_page=1")
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let page: TokenPage = response.into_json().await.unwrap();
        assert_eq!(page.pagination.per_page, 5);
        assert_eq!(page.pagination.total, 12);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.page, 3);
        assert_eq!(page.tokens.len(), 2);

        // Junk query values fall back to defaults.
        let page: TokenPage = client
            .get("/admin/tokens?page=abc&per_page=")
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.per_page, 20);
        assert_eq!(page.tokens.len(), 12);
        assert!(page
            .tokens
            .windows(2)
            .all(|pair| pair[0].created_at >= pair[1].created_at));
    }

    #[backend_test(admin)]
    async fn generate_rejects_bad_counts(client: Client) {
        for count in [json!(0), json!(5001), json!("many"), json!(1.5)] {
            let response = post_generate(&client, json!({ "count": count })).await;
            assert_eq!(Status::BadRequest, response.status());
        }

        // No count means one.
        let generated: GenerateResponse = post_generate(&client, json!({}))
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(generated.generated_count, 1);
    }

    #[backend_test(admin)]
    async fn ending_twice(client: Client, tokens: Coll<Token>) {
        post_generate(&client, json!({ "count": 3 })).await;

        let first: EndResponse = client
            .post(uri!(end_pemira))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(first.affected_active_tokens, 3);

        let second: EndResponse = client
            .post(uri!(end_pemira))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert!(second.success);
        assert_eq!(second.affected_active_tokens, 0);

        let response = post_generate(&client, json!({ "count": 1 })).await;
        assert_eq!(Status::Conflict, response.status());
        assert_eq!(tokens.count_documents(None, None).await.unwrap(), 3);
    }

    #[backend_test(admin)]
    async fn stats_and_votes(
        client: Client,
        db_client: MongoClient,
        db: Database,
        new_tokens: Coll<NewToken>,
    ) {
        new_tokens
            .insert_many(
                [
                    NewToken::example(),
                    NewToken::example_legacy(),
                    NewToken::active("31415926"),
                ],
                None,
            )
            .await
            .unwrap();
        for (pin, candidate_id) in [("48151623", 1), ("04217", 2)] {
            let keys = PinKeys::normalize(pin).unwrap();
            redeem(&db_client, &db, &keys, candidate_id).await.unwrap();
        }

        let response = client.get(uri!(stats)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let StatsResponse { success, stats } = response.into_json().await.unwrap();
        assert!(success);
        assert_eq!(stats.total_votes, 2);
        assert_eq!(stats.winners, vec![1, 2]);
        assert_eq!(stats.token_summary.active, 1);
        assert_eq!(stats.token_summary.used, 2);
        assert_eq!(stats.token_summary.total, 3);
        assert!(!stats.election_status.is_ended);
        let per_candidate: Vec<_> = stats
            .candidate_votes
            .iter()
            .map(|c| (c.id, c.total_votes))
            .collect();
        assert_eq!(per_candidate, vec![(1, 1), (2, 1), (3, 0)]);

        let page: VotePage = client
            .get(uri!(votes))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 2);
        let mut rows: Vec<_> = page
            .votes
            .iter()
            .map(|v| (v.token.as_str(), v.candidate_id))
            .collect();
        rows.sort();
        assert_eq!(rows, vec![("004217", 2), ("48151623", 1)]);
        assert!(page.votes.iter().all(|v| v.candidate_name != "Unknown candidate"));
    }

    #[backend_test(admin)]
    async fn closeout_keeps_votes_and_uses_up_tokens(
        client: Client,
        db_client: MongoClient,
        db: Database,
        new_tokens: Coll<NewToken>,
    ) {
        new_tokens
            .insert_many(
                [
                    NewToken::example(),
                    NewToken::example_legacy(),
                    NewToken::active("31415926"),
                ],
                None,
            )
            .await
            .unwrap();
        for (pin, candidate_id) in [("48151623", 1), ("04217", 1)] {
            let keys = PinKeys::normalize(pin).unwrap();
            redeem(&db_client, &db, &keys, candidate_id).await.unwrap();
        }

        let closed: EndResponse = client
            .post(uri!(end_pemira))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(closed.affected_active_tokens, 1);

        let StatsResponse { stats, .. } = client
            .get(uri!(stats))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert!(stats.election_status.is_ended);
        assert!(stats.election_status.ended_at.is_some());
        assert_eq!(stats.total_votes, 2);
        assert_eq!(stats.winners, vec![1]);
        assert_eq!(stats.token_summary.active, 0);
        assert_eq!(stats.token_summary.used, 3);
        assert_eq!(stats.token_summary.total, 3);
        // Votes are the used tokens minus the ones swept by the closeout.
        let per_candidate: u64 = stats.candidate_votes.iter().map(|c| c.total_votes).sum();
        assert_eq!(
            per_candidate,
            stats.token_summary.used - closed.affected_active_tokens
        );
    }
}
