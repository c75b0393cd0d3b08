use mongodb::{Client, Database};
use rocket::{serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            pin::{PinInput, PinKeys},
            response::Message,
            vote::{VerifyPinRequest, VerifyPinResponse, VoteRequest},
        },
        db::redemption::{check_pin, redeem},
    },
};

pub fn routes() -> Vec<Route> {
    routes![verify_pin, vote]
}

fn invalid_payload() -> Error {
    Error::bad_request("Invalid payload.")
}

/// Normalise the PIN, treating a missing one like an empty one.
fn pin_keys(pin: Option<&PinInput>) -> Result<PinKeys> {
    pin.map_or_else(|| PinKeys::normalize(""), PinInput::normalize)
}

#[post("/verify-pin", data = "<request>")]
pub async fn verify_pin(
    request: Option<Json<VerifyPinRequest>>,
    db: &State<Database>,
) -> Result<Json<VerifyPinResponse>> {
    let request = request.ok_or_else(invalid_payload)?;
    let keys = pin_keys(request.pin())?;
    let pin = check_pin(db, &keys).await?;

    Ok(Json(VerifyPinResponse {
        success: true,
        message: "PIN is valid. Please choose a candidate.".to_string(),
        pin,
    }))
}

#[post("/vote", data = "<request>")]
pub async fn vote(
    request: Option<Json<VoteRequest>>,
    db_client: &State<Client>,
    db: &State<Database>,
) -> Result<Json<Message>> {
    let request = request.ok_or_else(invalid_payload)?;
    let keys = pin_keys(request.pin.as_ref())?;
    let candidate_id = request.candidate_id()?;

    let redemption = redeem(db_client, db, &keys, candidate_id).await?;
    info!(
        "Recorded vote {} for candidate {}",
        redemption.vote_id, redemption.candidate_id
    );

    Ok(Json(Message::success("Your vote has been recorded.")))
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;
    use rocket::{
        futures::future::join_all,
        http::{ContentType, Status},
        local::asynchronous::{Client, LocalResponse},
        serde::json::{json, Value},
    };

    use super::*;
    use crate::model::{
        db::{
            token::{NewToken, Token, TokenStatus},
            vote::Vote,
        },
        mongodb::Coll,
    };

    async fn post_vote<'c>(client: &'c Client, body: Value) -> LocalResponse<'c> {
        client
            .post(uri!(vote))
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await
    }

    async fn post_verify<'c>(client: &'c Client, body: Value) -> LocalResponse<'c> {
        client
            .post(uri!(verify_pin))
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await
    }

    #[backend_test]
    async fn verify_then_vote(client: Client, new_tokens: Coll<NewToken>, tokens: Coll<Token>) {
        new_tokens.insert_one(NewToken::example(), None).await.unwrap();

        let response = post_verify(&client, json!({ "pin": "4815 1623" })).await;
        assert_eq!(Status::Ok, response.status());
        let verified: VerifyPinResponse = response.into_json().await.unwrap();
        assert!(verified.success);
        assert_eq!(verified.pin, "48151623");

        // Checking the PIN does not use it up.
        let token = tokens
            .find_one(doc! { "value": "48151623" }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.status, TokenStatus::Active);

        let response = post_vote(&client, json!({ "pin": "48151623", "candidateId": 1 })).await;
        assert_eq!(Status::Ok, response.status());
        let message: Message = response.into_json().await.unwrap();
        assert!(message.success);

        let response = post_vote(&client, json!({ "pin": "48151623", "candidateId": 1 })).await;
        assert_eq!(Status::Unauthorized, response.status());
        let message: Message = response.into_json().await.unwrap();
        assert!(!message.success);
    }

    #[backend_test]
    async fn legacy_token_field_is_accepted(client: Client, new_tokens: Coll<NewToken>) {
        new_tokens
            .insert_one(NewToken::example_legacy(), None)
            .await
            .unwrap();

        let response = post_verify(&client, json!({ "token": 4217 })).await;
        assert_eq!(Status::Ok, response.status());
        let verified: VerifyPinResponse = response.into_json().await.unwrap();
        assert_eq!(verified.pin, "004217");
    }

    #[backend_test]
    async fn bad_input_is_rejected(client: Client, new_tokens: Coll<NewToken>) {
        new_tokens.insert_one(NewToken::example(), None).await.unwrap();

        for body in [
            json!({ "pin": "1234", "candidateId": 1 }),
            json!({ "candidateId": 1 }),
            json!({ "pin": "48151623", "candidateId": 0 }),
            json!({ "pin": "48151623", "candidateId": "two" }),
            json!({ "pin": "48151623" }),
        ] {
            let response = post_vote(&client, body).await;
            assert_eq!(Status::BadRequest, response.status());
        }

        let response = client
            .post(uri!(vote))
            .header(ContentType::JSON)
            .body("{not json")
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        let message: Message = response.into_json().await.unwrap();
        assert_eq!(message.message, "Invalid payload.");
    }

    #[backend_test]
    async fn unknown_candidate_keeps_token(client: Client, new_tokens: Coll<NewToken>, tokens: Coll<Token>) {
        new_tokens.insert_one(NewToken::example(), None).await.unwrap();

        let response = post_vote(&client, json!({ "pin": "48151623", "candidateId": 42 })).await;
        assert_eq!(Status::NotFound, response.status());

        let token = tokens
            .find_one(doc! { "value": "48151623" }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.status, TokenStatus::Active);
    }

    #[backend_test]
    async fn verify_reports_no_tokens(client: Client) {
        let response = post_verify(&client, json!({ "pin": "48151623" })).await;
        assert_eq!(Status::Conflict, response.status());
    }

    #[backend_test]
    async fn concurrent_votes_with_one_pin(client: Client, new_tokens: Coll<NewToken>, votes: Coll<Vote>) {
        new_tokens.insert_one(NewToken::example(), None).await.unwrap();

        let body = json!({ "pin": "48151623", "candidateId": 2 });
        let requests = (0..6).map(|_| post_vote(&client, body.clone()));
        let statuses: Vec<Status> = join_all(requests)
            .await
            .iter()
            .map(|response| response.status())
            .collect();

        assert_eq!(statuses.iter().filter(|&&s| s == Status::Ok).count(), 1);
        assert!(statuses
            .iter()
            .all(|&s| s == Status::Ok || s == Status::Unauthorized || s == Status::Conflict));
        assert_eq!(votes.count_documents(None, None).await.unwrap(), 1);
    }
}
