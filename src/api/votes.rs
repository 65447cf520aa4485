use std::collections::HashMap;
use std::sync::Arc;

use mongodb::{bson::doc, Client};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            request::CreateVoteRequest,
            response::{CandidateView, CreatedVote, Envelope, QuestionView, VoteView},
        },
        db::{candidate::Candidate, question::Question, vote::Vote},
        mongodb::{Coll, Counter, MongoCollection, RowId, VoteId},
    },
    pagination::{Connection, PageArgs, PaginationEngine},
    policy::{Action, Authorize, Resource},
    token::StaffClaims,
};

pub fn routes() -> Vec<Route> {
    routes![list_votes, list_questions, create_vote]
}

/// Load a vote the caller may see: admins see every vote, others only their own.
pub(crate) async fn visible_vote(
    votes: &Coll<Vote>,
    staff: &StaffClaims,
    vote_id: VoteId,
) -> Result<Vote> {
    let vote = votes
        .find_one(doc! { "_id": vote_id }, None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Vote {vote_id}")))?;
    if !staff.is_admin() && vote.owner != staff.id {
        return Err(Error::Forbidden(format!("Vote {vote_id} belongs to another user")));
    }
    Ok(vote)
}

/// Escape a string for literal use inside a MongoDB `$regex`.
fn escape_regex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[get("/votes?<page..>")]
pub async fn list_votes(
    staff: std::result::Result<StaffClaims, Error>,
    page: PageArgs,
    votes: Coll<Vote>,
    policy: &State<Arc<dyn Authorize>>,
    pages: &State<PaginationEngine>,
) -> Result<Json<Envelope<Connection<VoteView>>>> {
    let staff = staff?;
    policy.require(&staff, Resource::Votes, Action::Read)?;

    let filter = if staff.is_admin() {
        doc! {}
    } else {
        doc! { "owner": staff.id }
    };
    let connection = pages.paginate(&votes, filter, &page).await?;
    Ok(Envelope::ok(connection.map(VoteView::from)))
}

#[allow(clippy::too_many_arguments)]
#[get("/votes/<vote_id>/questions?<title>&<candidates>&<page..>")]
pub async fn list_questions(
    staff: std::result::Result<StaffClaims, Error>,
    vote_id: VoteId,
    title: Option<String>,
    candidates: Option<bool>,
    page: PageArgs,
    votes: Coll<Vote>,
    questions: Coll<Question>,
    candidate_coll: Coll<Candidate>,
    policy: &State<Arc<dyn Authorize>>,
    pages: &State<PaginationEngine>,
) -> Result<Json<Envelope<Connection<QuestionView>>>> {
    let staff = staff?;
    policy.require(&staff, Resource::Questions, Action::Read)?;
    visible_vote(&votes, &staff, vote_id).await?;

    let mut filter = doc! { "vote_id": vote_id };
    if let Some(title) = title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        filter.insert(
            "title",
            doc! { "$regex": escape_regex(title), "$options": "i" },
        );
    }
    let connection = pages
        .paginate(&questions, filter, &page)
        .await?
        .map(QuestionView::from);

    if !candidates.unwrap_or(false) {
        return Ok(Envelope::ok(connection));
    }

    // Preload the candidates of every question on this page.
    let question_ids: Vec<RowId> = connection.edges.iter().map(|e| e.node.id).collect();
    let mut by_question: HashMap<RowId, Vec<CandidateView>> = HashMap::new();
    let mut cursor = candidate_coll
        .find(doc! { "question_id": { "$in": question_ids } }, None)
        .await?;
    while let Some(candidate) = cursor.try_next().await? {
        by_question
            .entry(candidate.question_id)
            .or_default()
            .push(candidate.into());
    }
    Ok(Envelope::ok(connection.map(|mut question| {
        question.candidates = Some(by_question.remove(&question.id).unwrap_or_default());
        question
    })))
}

#[post("/votes", data = "<request>", format = "json")]
pub async fn create_vote(
    staff: std::result::Result<StaffClaims, Error>,
    request: Json<CreateVoteRequest>,
    votes: Coll<Vote>,
    questions: Coll<Question>,
    candidates: Coll<Candidate>,
    counters: Coll<Counter>,
    policy: &State<Arc<dyn Authorize>>,
    db_client: &State<Client>,
) -> Result<Json<Envelope<CreatedVote>>> {
    let staff = staff?;
    policy.require(&staff, Resource::Votes, Action::Create)?;

    let request = request.into_inner();
    if request.questions.is_empty() {
        return Err(Error::validation("Vote must have at least one question"));
    }
    for question in &request.questions {
        if question.title.trim().is_empty() {
            return Err(Error::validation("Question title must not be empty"));
        }
        if question.candidates.is_empty() {
            return Err(Error::validation(format!(
                "Question '{}' has no candidates",
                question.title
            )));
        }
        if question.candidates.iter().any(|c| c.trim().is_empty()) {
            return Err(Error::validation("Candidate name must not be empty"));
        }
    }

    // Reserve every ID up front so the inserts below are a single batch each.
    let row = Counter::next(&counters, Vote::NAME).await?;
    let vote = Vote::new(
        row,
        staff.id,
        request.title,
        request.description,
        request.start_at,
        request.end_at,
    )?;
    let candidate_total: usize = request.questions.iter().map(|q| q.candidates.len()).sum();
    let first_question = Counter::reserve(&counters, Question::NAME, request.questions.len() as u64).await?;
    let first_candidate = Counter::reserve(&counters, Candidate::NAME, candidate_total as u64).await?;

    let mut new_questions = Vec::with_capacity(request.questions.len());
    let mut new_candidates = Vec::with_capacity(candidate_total);
    for (i, question) in request.questions.into_iter().enumerate() {
        let question_id = RowId(first_question.0 + i as u64);
        for name in question.candidates {
            let candidate_id = RowId(first_candidate.0 + new_candidates.len() as u64);
            new_candidates.push(Candidate::new(candidate_id, question_id, name));
        }
        new_questions.push(Question::new(
            question_id,
            vote.id,
            question.title,
            question.description,
        ));
    }

    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;
    let inserted = async {
        votes.insert_one_with_session(&vote, None, &mut session).await?;
        questions
            .insert_many_with_session(&new_questions, None, &mut session)
            .await?;
        candidates
            .insert_many_with_session(&new_candidates, None, &mut session)
            .await?;
        Ok::<_, mongodb::error::Error>(())
    }
    .await;
    if let Err(e) = inserted {
        session.abort_transaction().await?;
        return Err(e.into());
    }
    session.commit_transaction().await?;
    info!(
        "User {} created vote {} with {} question(s)",
        staff.id,
        vote.id,
        new_questions.len()
    );

    let mut views_by_question: HashMap<RowId, Vec<CandidateView>> = HashMap::new();
    for candidate in new_candidates {
        views_by_question
            .entry(candidate.question_id)
            .or_default()
            .push(candidate.into());
    }
    let question_views = new_questions
        .into_iter()
        .map(|question| {
            let candidates = views_by_question.remove(&question.id).unwrap_or_default();
            QuestionView {
                candidates: Some(candidates),
                ..question.into()
            }
        })
        .collect();
    Ok(Envelope::ok(CreatedVote {
        vote: vote.into(),
        questions: question_views,
    }))
}
