use actix_web::{web, HttpResponse, Responder};
use chrono::{NaiveDate, Utc};

use crate::calendar::local_date;
use crate::db::AppState;
use crate::document::{
    is_preview_id, DocumentError, DocumentService, GeneratedDocument, PREVIEW_ID, PREVIEW_QR_ID,
};
use crate::letter::models::{
    ApproveRequest, ApproveResponse, CreationMode, LetterDraft, LetterResponse, LetterStatus,
    ParafRequest, PreviewRequest, RejectRequest, SubmitLetterRequest, SubmitResponse,
    UPLOAD_BODY_MARKER, VerificationResponse,
};
use crate::letter::verification_record;
use crate::workflow::WorkflowError;
use crate::ErrorResponse;

pub const STAMP_SKIPPED_HEADER: &str = "X-Stamp-Skipped";

fn workflow_error_response(e: &WorkflowError) -> HttpResponse {
    let message = e.to_string();
    if e.is_not_found() {
        HttpResponse::NotFound().json(ErrorResponse::not_found(&message))
    } else if e.is_precondition() {
        HttpResponse::Conflict().json(ErrorResponse::new("Conflict", &message))
    } else if matches!(e, WorkflowError::Validation(_)) {
        HttpResponse::BadRequest().json(ErrorResponse::bad_request(&message))
    } else {
        log::error!("Workflow failure: {}", message);
        HttpResponse::InternalServerError().json(ErrorResponse::internal_error(&message))
    }
}

fn document_error_response(e: &DocumentError) -> HttpResponse {
    match e {
        DocumentError::MissingSubject | DocumentError::EmptySource => {
            HttpResponse::BadRequest().json(ErrorResponse::bad_request(&e.to_string()))
        }
        _ => {
            log::error!("Document generation failed: {}", e);
            HttpResponse::InternalServerError()
                .json(ErrorResponse::internal_error("Failed to generate document"))
        }
    }
}

fn pdf_response(doc: GeneratedDocument, disposition: &str) -> HttpResponse {
    let mut response = HttpResponse::Ok();
    response.content_type("application/pdf").insert_header((
        "Content-Disposition",
        format!("{}; filename=\"{}\"", disposition, doc.filename),
    ));
    if let Some(report) = doc.stamp_report.filter(|r| r.skipped > 0) {
        response.insert_header((STAMP_SKIPPED_HEADER, report.skipped.to_string()));
    }
    response.body(doc.pdf)
}

/// Run a render on the blocking pool; Typst and lopdf are synchronous.
async fn render_blocking<F>(data: &web::Data<AppState>, disposition: &str, render: F) -> HttpResponse
where
    F: FnOnce(&DocumentService) -> Result<GeneratedDocument, DocumentError>
        + Send
        + 'static,
{
    let documents = data.documents.clone();
    match web::block(move || render(&documents)).await {
        Ok(Ok(doc)) => pdf_response(doc, disposition),
        Ok(Err(e)) => document_error_response(&e),
        Err(e) => {
            log::error!("Render task failed: {}", e);
            HttpResponse::InternalServerError()
                .json(ErrorResponse::internal_error("Failed to generate document"))
        }
    }
}

fn today(data: &web::Data<AppState>) -> NaiveDate {
    local_date(Utc::now(), data.config.utc_offset_hours)
}

/// Render date of a stored letter: the signing day once signed, today before.
fn render_date(letter: &LetterDraft, utc_offset_hours: i32) -> NaiveDate {
    let at = letter.approver.signed_at.unwrap_or_else(Utc::now);
    local_date(at, utc_offset_hours)
}

#[utoipa::path(
    context_path = "/api",
    tag = "Letter Service",
    post,
    path = "/letters/preview",
    request_body = PreviewRequest,
    responses(
        (status = 200, description = "Draft PDF", content_type = "application/pdf", body = Vec<u8>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Approver not found", body = ErrorResponse),
        (status = 500, description = "Generation failed", body = ErrorResponse)
    )
)]
pub async fn preview_letter(
    req: web::Json<PreviewRequest>,
    data: web::Data<AppState>,
) -> impl Responder {
    let req = req.into_inner();
    let approver = match req.approver_id.as_deref().filter(|id| !id.trim().is_empty()) {
        Some(id) => match data.engine.signatory(id).await {
            Ok(signatory) => signatory,
            Err(e) => return workflow_error_response(&e),
        },
        None => Default::default(),
    };
    if req.mode == CreationMode::Upload && req.upload.is_none() {
        return HttpResponse::BadRequest()
            .json(ErrorResponse::bad_request("Upload preview requires a source PDF"));
    }

    let now = Utc::now();
    let (id, body) = match req.mode {
        CreationMode::Web => (PREVIEW_ID, req.body),
        CreationMode::Upload => (PREVIEW_QR_ID, UPLOAD_BODY_MARKER.to_string()),
    };
    let letter = LetterDraft {
        id: id.to_string(),
        subject: req.subject,
        recipient_title: req.recipient_title,
        recipient_name: req.recipient_name,
        body,
        cc: req.cc,
        attachments: req.attachments,
        mode: req.mode,
        upload: req.upload,
        approver,
        status: LetterStatus::Draft,
        created_at: now,
        updated_at: now,
        ..LetterDraft::default()
    };

    let date = today(&data);
    render_blocking(&data, "inline", move |documents| {
        documents.render_preview(&letter, date)
    })
    .await
}

#[utoipa::path(
    context_path = "/api",
    tag = "Letter Service",
    post,
    path = "/letters",
    request_body = SubmitLetterRequest,
    responses(
        (status = 200, description = "Letter submitted for review", body = SubmitResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Person, letter or letter type not found", body = ErrorResponse),
        (status = 409, description = "Letter cannot be resubmitted", body = ErrorResponse)
    )
)]
pub async fn submit_letter(
    req: web::Json<SubmitLetterRequest>,
    data: web::Data<AppState>,
) -> impl Responder {
    match data.engine.submit(req.into_inner(), Utc::now()).await {
        Ok(letter) => HttpResponse::Ok().json(SubmitResponse {
            success: true,
            id: letter.id,
        }),
        Err(e) => workflow_error_response(&e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Letter Service",
    post,
    path = "/letters/{id}/paraf",
    request_body = ParafRequest,
    responses(
        (status = 200, description = "Paraf recorded", body = LetterResponse),
        (status = 404, description = "Letter not found", body = ErrorResponse),
        (status = 409, description = "Not this reviewer's turn", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Letter id")
    )
)]
pub async fn paraf_letter(
    id: web::Path<String>,
    req: web::Json<ParafRequest>,
    data: web::Data<AppState>,
) -> impl Responder {
    match data.engine.paraf(&id, &req.reviewer_id, Utc::now()).await {
        Ok(letter) => HttpResponse::Ok().json(LetterResponse {
            success: true,
            data: letter,
        }),
        Err(e) => workflow_error_response(&e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Letter Service",
    post,
    path = "/letters/{id}/approve",
    request_body = ApproveRequest,
    responses(
        (status = 200, description = "Letter approved and numbered", body = ApproveResponse),
        (status = 404, description = "Letter not found", body = ErrorResponse),
        (status = 409, description = "Reviewers pending or wrong approver", body = ErrorResponse),
        (status = 500, description = "Numbering failed", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Letter id")
    )
)]
pub async fn approve_letter(
    id: web::Path<String>,
    req: web::Json<ApproveRequest>,
    data: web::Data<AppState>,
) -> impl Responder {
    match data.engine.approve(&id, &req.approver_id, Utc::now()).await {
        Ok(outcome) => HttpResponse::Ok().json(ApproveResponse {
            success: true,
            nomor: outcome.letter_number,
        }),
        Err(e) => workflow_error_response(&e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Letter Service",
    post,
    path = "/letters/{id}/reject",
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Letter returned for revision", body = LetterResponse),
        (status = 404, description = "Letter not found", body = ErrorResponse),
        (status = 409, description = "Letter is not under review", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Letter id")
    )
)]
pub async fn reject_letter(
    id: web::Path<String>,
    req: web::Json<RejectRequest>,
    data: web::Data<AppState>,
) -> impl Responder {
    match data
        .engine
        .reject(&id, &req.actor_id, &req.note, Utc::now())
        .await
    {
        Ok(letter) => HttpResponse::Ok().json(LetterResponse {
            success: true,
            data: letter,
        }),
        Err(e) => workflow_error_response(&e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Letter Service",
    get,
    path = "/letters/{id}/download",
    responses(
        (status = 200, description = "Current PDF of the letter", content_type = "application/pdf", body = Vec<u8>),
        (status = 404, description = "Letter not found", body = ErrorResponse),
        (status = 500, description = "Generation failed", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Letter id")
    )
)]
pub async fn download_letter(id: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    let letter = match data.engine.get(&id).await {
        Ok(letter) => letter,
        Err(e) => return workflow_error_response(&e),
    };
    let date = render_date(&letter, data.config.utc_offset_hours);
    render_blocking(&data, "attachment", move |documents| {
        documents.render_letter(&letter, date)
    })
    .await
}

#[utoipa::path(
    context_path = "/api",
    tag = "Verification",
    get,
    path = "/public/verify/{id}",
    responses(
        (status = 200, description = "Verification record", body = VerificationResponse),
        (status = 404, description = "No such letter", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Letter id printed in the QR code")
    )
)]
pub async fn verify_letter(id: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    let not_found = || {
        HttpResponse::NotFound().json(ErrorResponse::not_found(&format!(
            "Letter '{}' not found",
            id.as_str()
        )))
    };
    if is_preview_id(&id) {
        return not_found();
    }

    match data.engine.get(&id).await {
        Ok(letter) => match verification_record(&letter) {
            Some(record) => HttpResponse::Ok().json(VerificationResponse {
                success: true,
                data: record,
            }),
            None => not_found(),
        },
        Err(e) if e.is_not_found() => not_found(),
        Err(e) => workflow_error_response(&e),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/letters").route(web::post().to(submit_letter)))
        .service(web::resource("/letters/preview").route(web::post().to(preview_letter)))
        .service(web::resource("/letters/{id}/paraf").route(web::post().to(paraf_letter)))
        .service(web::resource("/letters/{id}/approve").route(web::post().to(approve_letter)))
        .service(web::resource("/letters/{id}/reject").route(web::post().to(reject_letter)))
        .service(web::resource("/letters/{id}/download").route(web::get().to(download_letter)))
        .service(web::resource("/public/verify/{id}").route(web::get().to(verify_letter)));
}
