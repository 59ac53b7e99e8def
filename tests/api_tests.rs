//! HTTP surface over in-memory state.

use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};

use eoffice_server::document::{DocumentService, DocumentSettings};
use eoffice_server::letter::handlers;
use eoffice_server::workflow::{InMemoryDirectory, LetterType, PersonProfile};
use eoffice_server::{AppConfig, AppState};

fn state() -> web::Data<AppState> {
    let config = AppConfig::default();
    let directory = Arc::new(InMemoryDirectory::new());
    directory.load_person_record("maker", &json!({ "nama": "Rina", "unit": "KB" }));
    directory.load_person_record("rev-1", &json!({ "profile": { "nama": "Budi" } }));
    directory.insert_person(PersonProfile {
        id: "head".into(),
        name: "Siti Aminah".into(),
        job_title: "Kepala Sekolah".into(),
        ..Default::default()
    });
    directory.insert_letter_type(LetterType {
        code: "SK".into(),
        format_code: "SK".into(),
        requires_committee_code: false,
    });

    let documents = DocumentService::new(&DocumentSettings {
        typst_bin: PathBuf::from("typst"),
        ..config.document_settings()
    })
    .unwrap();
    web::Data::new(AppState::in_memory(config, directory, Arc::new(documents)))
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .service(web::scope("/api").configure(handlers::config)),
        )
        .await
    };
}

#[actix_web::test]
async fn test_submit_paraf_approve_verify() {
    let state = state();
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/letters")
        .set_json(json!({
            "maker_id": "maker",
            "approver_id": "head",
            "reviewer_ids": ["rev-1"],
            "unit_code": "MIJ",
            "letter_type": "SK",
            "subject": "Pemberitahuan Libur",
            "body": "<p>Dengan hormat, sekolah libur pada tanggal 1 Desember.</p>"
        }))
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["success"], true);
    let id = resp["id"].as_str().unwrap().to_string();

    // The approver cannot act before the reviewer.
    let req = test::TestRequest::post()
        .uri(&format!("/api/letters/{id}/approve"))
        .set_json(json!({ "approver_id": "head" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri(&format!("/api/letters/{id}/paraf"))
        .set_json(json!({ "reviewer_id": "rev-1" }))
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["current_step"], 1);

    let req = test::TestRequest::post()
        .uri(&format!("/api/letters/{id}/approve"))
        .set_json(json!({ "approver_id": "head" }))
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    let nomor = resp["nomor"].as_str().unwrap();
    assert!(nomor.starts_with("001/SK/MIJ/"));

    let req = test::TestRequest::get()
        .uri(&format!("/api/public/verify/{id}"))
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["data"]["status"], "APPROVED");
    assert_eq!(resp["data"]["letter_number"], nomor);
    assert_eq!(resp["data"]["approver_name"], "Siti Aminah");
    assert_eq!(resp["data"]["maker_unit"], "KB");
    assert!(resp["data"]["body_snippet"]
        .as_str()
        .unwrap()
        .starts_with("Dengan hormat, sekolah libur"));
}

#[actix_web::test]
async fn test_preview_sentinels_are_not_verifiable() {
    let state = state();
    let app = app!(state);
    for id in ["PREVIEW", "PREVIEW_QR", "no-such-letter"] {
        let req = test::TestRequest::get()
            .uri(&format!("/api/public/verify/{id}"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

#[actix_web::test]
async fn test_error_statuses() {
    let state = state();
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/letters")
        .set_json(json!({
            "maker_id": "maker",
            "approver_id": "head",
            "unit_code": "MIJ",
            "letter_type": "SK",
            "subject": ""
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "BadRequest");

    let req = test::TestRequest::post()
        .uri("/api/letters")
        .set_json(json!({
            "maker_id": "maker",
            "approver_id": "ghost",
            "unit_code": "MIJ",
            "letter_type": "SK",
            "subject": "Undangan"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri("/api/letters/missing/download")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_upload_preview_returns_pdf() {
    use base64::Engine as _;
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, b"BT ET".to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();

    let state = state();
    let app = app!(state);
    let req = test::TestRequest::post()
        .uri("/api/letters/preview")
        .set_json(json!({
            "subject": "Laporan",
            "mode": "upload",
            "upload": {
                "file_base64": base64::engine::general_purpose::STANDARD.encode(&bytes),
                "placements": [
                    { "page_index": 0, "kind": "number", "x": 10, "y": 10 },
                    { "page_index": 3, "kind": "qr", "x": 10, "y": 10 }
                ]
            }
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-type").unwrap(), "application/pdf");
    assert_eq!(resp.headers().get(handlers::STAMP_SKIPPED_HEADER).unwrap(), "1");
    let disposition = resp.headers().get("content-disposition").unwrap().to_str().unwrap();
    assert_eq!(disposition, "inline; filename=\"Laporan.pdf\"");

    let body = test::read_body(resp).await;
    assert!(body.starts_with(b"%PDF"));
}
