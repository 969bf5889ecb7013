use actix_web::{get, post, put, web, HttpResponse};

use crate::{
    app_state::AppState,
    auth::AuthenticatedUser,
    errors::AppError,
    models::dto::request::{PauseAttemptRequest, RecordAnswerRequest, SubmitAttemptRequest},
};

#[post("/exams/{exam_id}/start")]
async fn start_attempt(
    state: web::Data<AppState>,
    exam_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let response = state
        .attempt_service
        .start_attempt(&auth.exam_user(), &exam_id)
        .await?;

    if response.resumed {
        Ok(HttpResponse::Ok().json(response))
    } else {
        Ok(HttpResponse::Created().json(response))
    }
}

#[put("/exams/{exam_id}/attempts/{attempt_id}/answers")]
async fn record_answer(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    request: web::Json<RecordAnswerRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let (exam_id, attempt_id) = path.into_inner();
    let response = state
        .attempt_service
        .record_answer(&auth.exam_user(), &exam_id, &attempt_id, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

#[post("/exams/{exam_id}/attempts/{attempt_id}/pause")]
async fn pause_attempt(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    request: web::Json<PauseAttemptRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let (exam_id, attempt_id) = path.into_inner();
    let response = state
        .attempt_service
        .pause_attempt(&auth.exam_user(), &exam_id, &attempt_id, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

#[post("/exams/{exam_id}/submit")]
async fn submit_attempt(
    state: web::Data<AppState>,
    exam_id: web::Path<String>,
    request: web::Json<SubmitAttemptRequest>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let response = state
        .attempt_service
        .submit(&auth.exam_user(), &exam_id, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

#[get("/exams/{exam_id}/attempts/{attempt_id}/result")]
async fn get_result(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let (exam_id, attempt_id) = path.into_inner();
    let response = state
        .attempt_service
        .get_result(&auth.exam_user(), &exam_id, &attempt_id)
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

#[get("/exams/{exam_id}/eligibility")]
async fn get_eligibility(
    state: web::Data<AppState>,
    exam_id: web::Path<String>,
    auth: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let response = state
        .attempt_service
        .eligibility(&auth.exam_user(), &exam_id)
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Routes mounted under the authenticated `/api` scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(start_attempt)
        .service(record_answer)
        .service(pause_attempt)
        .service(submit_attempt)
        .service(get_result)
        .service(get_eligibility);
}
