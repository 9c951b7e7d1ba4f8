// API route handlers for the subtitle service
//
// This module contains the route handlers for the HTTP API.
// It implements the actual HTTP endpoints for the API.

use crate::config::{AuthConfig, HandlerConfig, ServerConfig};
use crate::error::HandlerError;
use crate::file_utils::{subtitle_file_name, FolderCleanup};
use crate::handlers::form::extract_form_data;
use crate::models::TranscriptionResponse;
use crate::queue_manager::{QueueManager, QueueStatus};
use crate::subtitles::OutputFormat;
use crate::transcriber::{Transcriber, TranscriptionJob};
use actix_web::http::header;
use actix_web::{get, options, post, web, HttpRequest, HttpResponse};
use actix_multipart::Multipart;
use log::{error, info};
use serde::Serialize;

/// Handler for transcription requests
///
/// This endpoint receives an audio file and transcription parameters, admits the job into
/// the queue and waits for it to complete. The response carries the subtitles in the
/// requested format. The uploaded audio is removed once the job is over.
#[post("/api/transcribe")]
pub async fn transcribe(
    form: Multipart,
    queue_manager: web::Data<QueueManager>,
    transcriber: web::Data<Transcriber>,
    config: web::Data<HandlerConfig>,
) -> Result<HttpResponse, HandlerError> {
    let (params, job_paths) = extract_form_data(form, &config).await?;
    let _cleanup = FolderCleanup::new(job_paths.folder.clone());

    let label = params
        .original_name
        .clone()
        .unwrap_or_else(|| job_paths.id.clone());
    let format = params.response_format;

    let job = TranscriptionJob {
        id: job_paths.id.clone(),
        label: label.clone(),
        audio_file: job_paths.audio_file,
        folder_path: job_paths.folder,
        model: params.model,
        language: params.language,
        task: params.task,
    };

    info!(
        "Job {} ('{}') submitted: model {}, language {}, task {}, format {}",
        job.id, label, job.model, job.language, job.task, format
    );

    let output = queue_manager
        .submit(label.clone(), move |context| async move {
            transcriber
                .run(&job, |percent| context.report_progress(percent))
                .await
                .map_err(HandlerError::from)
        })
        .await
        .map_err(|e| {
            error!("Transcription of '{}' failed: {}", label, e);
            e
        })?;

    let file_name = subtitle_file_name(&label, format);

    match format {
        OutputFormat::Json => Ok(HttpResponse::Ok().json(TranscriptionResponse {
            success: true,
            label,
            language: output.language,
            segments: output.transcript.len(),
            file_name,
            data: output.transcript.data,
        })),
        other => {
            let body = output.transcript.render(other)?;
            Ok(HttpResponse::Ok()
                .content_type(other.content_type())
                .insert_header((
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", file_name),
                ))
                .body(body))
        }
    }
}

/// Queue status endpoint
///
/// Read-only snapshot of the admission queue; clients poll it while waiting.
#[get("/api/queue-status")]
pub async fn queue_status(queue_manager: web::Data<QueueManager>) -> HttpResponse {
    HttpResponse::Ok().json(queue_manager.status())
}

/// API status endpoint
///
/// This endpoint provides information about the service configuration and current queue state.
#[get("/status")]
pub async fn api_status(
    queue_manager: web::Data<QueueManager>,
    transcriber: web::Data<Transcriber>,
    handler_config: web::Data<HandlerConfig>,
    server_config: web::Data<ServerConfig>,
    auth_config: web::Data<AuthConfig>,
) -> HttpResponse {
    #[derive(Serialize)]
    struct ApiStatusResponse {
        server: ServerInfo,
        processing: ProcessingInfo,
        resources: ResourceInfo,
        security: SecurityInfo,
        queue_state: QueueStatus,
    }

    #[derive(Serialize)]
    struct ServerInfo {
        host: String,
        port: u16,
        timeout: u64,
        keepalive: u64,
        worker_number: usize,
    }

    #[derive(Serialize)]
    struct ProcessingInfo {
        command: String,
        device: String,
        threads: usize,
        default_model: String,
        default_language: String,
        default_task: String,
        default_output_format: String,
    }

    #[derive(Serialize)]
    struct ResourceInfo {
        max_file_size: usize,
        max_waiting_jobs: Option<usize>,
    }

    #[derive(Serialize)]
    struct SecurityInfo {
        authorization_enabled: bool,
    }

    let tool = transcriber.config();

    let response = ApiStatusResponse {
        server: ServerInfo {
            host: server_config.host.clone(),
            port: server_config.port,
            timeout: server_config.timeout,
            keepalive: server_config.keepalive,
            worker_number: server_config.effective_workers(),
        },
        processing: ProcessingInfo {
            command: tool.command_path.clone(),
            device: tool.device.clone(),
            threads: tool.threads,
            default_model: handler_config.default_model.clone(),
            default_language: handler_config.default_language.clone(),
            default_task: handler_config.default_task.to_string(),
            default_output_format: handler_config.default_output_format.to_string(),
        },
        resources: ResourceInfo {
            max_file_size: handler_config.max_file_size,
            max_waiting_jobs: queue_manager.max_waiting(),
        },
        security: SecurityInfo {
            authorization_enabled: auth_config.enabled,
        },
        queue_state: queue_manager.status(),
    };

    HttpResponse::Ok().json(response)
}

/// Handler for OPTIONS requests to the transcription endpoint
///
/// Returns the allowed methods and CORS headers for pre-flight requests.
#[options("/api/transcribe")]
pub async fn transcription_options(_req: HttpRequest) -> HttpResponse {
    let allowed_methods = "OPTIONS, POST";

    HttpResponse::Ok()
        .append_header(("Allow", allowed_methods))
        .append_header(("Access-Control-Allow-Methods", allowed_methods))
        .append_header((
            "Access-Control-Allow-Headers",
            "Authorization, Content-Type",
        ))
        .append_header(("Access-Control-Max-Age", "86400")) // Cache preflight for 24 hours
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcriber::{TranscriberConfig, TranscriptionTask};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::path::{Path, PathBuf};

    const BOUNDARY: &str = "----subtitle-studio-test";

    const FAKE_TOOL: &str = r#"
out=""
lang=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift ;;
    --language) lang="$2"; shift ;;
  esac
  shift
done
echo "[PROGRESS] 50"
printf '{"data": [{"time": 0.0, "text": "hello"}, {"time": 1.25, "text": "world"}]}' > "$out"
echo "{\"success\": true, \"segments\": 2, \"language\": \"$lang\", \"output\": \"$out\"}"
"#;

    const FAILING_TOOL: &str = "echo 'no model' >&2\nexit 2\n";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    fn multipart_body(parts: &[Part]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                            name, value
                        )
                        .as_bytes(),
                    );
                }
                Part::File(name, file_name, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n",
                            name, file_name
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload_request(parts: &[Part]) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/transcribe")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(multipart_body(parts))
    }

    fn test_dir() -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("subtitle_studio_routes_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn handler_config(dir: &Path) -> HandlerConfig {
        HandlerConfig {
            temp_dir: dir.join("uploads").to_string_lossy().into_owned(),
            max_file_size: 1024,
            default_model: "base".to_string(),
            default_language: "zh".to_string(),
            default_task: TranscriptionTask::Transcribe,
            default_output_format: OutputFormat::Json,
        }
    }

    fn transcriber(dir: &Path, script: &str) -> Transcriber {
        let script_path = dir.join("tool.sh");
        std::fs::write(&script_path, script).unwrap();
        Transcriber::new(TranscriberConfig {
            command_path: "sh".to_string(),
            script_path: Some(script_path.to_string_lossy().into_owned()),
            device: "cpu".to_string(),
            threads: 1,
            models_dir: None,
        })
    }

    fn upload_folders(dir: &Path) -> usize {
        std::fs::read_dir(dir.join("uploads"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    macro_rules! app {
        ($dir:expr, $script:expr, $queue:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($queue))
                    .app_data(web::Data::new(transcriber($dir, $script)))
                    .app_data(web::Data::new(handler_config($dir)))
                    .service(transcribe)
                    .service(queue_status)
                    .service(transcription_options),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_queue_status_when_idle() {
        let dir = test_dir();
        let app = app!(&dir, FAKE_TOOL, QueueManager::new(None));

        let req = test::TestRequest::get().uri("/api/queue-status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "running": false, "current": null, "waitingCount": 0 }));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[actix_web::test]
    async fn test_missing_audio_is_rejected_before_queueing() {
        let dir = test_dir();
        let queue = QueueManager::new(None);
        let app = app!(&dir, FAKE_TOOL, queue.clone());

        let req = upload_request(&[Part::Text("language", "en")]).to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["error"], "No audio file provided in the request");
        assert!(!queue.status().running);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[actix_web::test]
    async fn test_invalid_task_removes_the_upload() {
        let dir = test_dir();
        let app = app!(&dir, FAKE_TOOL, QueueManager::new(None));

        let req = upload_request(&[
            Part::File("audio", "talk.wav", b"RIFF"),
            Part::Text("task", "summarize"),
        ])
        .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(upload_folders(&dir), 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[actix_web::test]
    async fn test_oversized_upload_is_rejected() {
        let dir = test_dir();
        let app = app!(&dir, FAKE_TOOL, QueueManager::new(None));

        let big = vec![0u8; 4096];
        let req = upload_request(&[Part::File("audio", "big.wav", &big)]).to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(upload_folders(&dir), 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(unix)]
    #[actix_web::test]
    async fn test_transcribe_returns_subtitles_as_json() {
        let dir = test_dir();
        let queue = QueueManager::new(None);
        let app = app!(&dir, FAKE_TOOL, queue.clone());

        let req = upload_request(&[
            Part::Text("language", "en"),
            Part::Text("task", "translate"),
            Part::File("audio", "/home/me/clips/interview.mp3", b"ID3 fake audio"),
        ])
        .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["label"], "interview.mp3");
        assert_eq!(body["language"], "en");
        assert_eq!(body["segments"], 2);
        assert_eq!(body["fileName"], "interview.json");
        assert_eq!(
            body["data"],
            json!([{ "time": 0.0, "text": "hello" }, { "time": 1.25, "text": "world" }])
        );

        assert!(!queue.status().running);
        assert_eq!(upload_folders(&dir), 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(unix)]
    #[actix_web::test]
    async fn test_unnamed_upload_is_labelled_with_job_id() {
        let dir = test_dir();
        let app = app!(&dir, FAKE_TOOL, QueueManager::new(None));

        let req = upload_request(&[Part::Text("audio", "RIFF raw bytes")]).to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body: Value = test::read_body_json(res).await;
        let label = body["label"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(label).is_ok(), "label was {}", label);
        assert_eq!(body["fileName"], format!("{}.json", label));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(unix)]
    #[actix_web::test]
    async fn test_transcribe_renders_srt_attachment() {
        let dir = test_dir();
        let app = app!(&dir, FAKE_TOOL, QueueManager::new(None));

        let req = upload_request(&[
            Part::File("file", "talk.wav", b"RIFF"),
            Part::Text("response_format", "srt"),
        ])
        .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"talk.srt\""
        );

        let body = test::read_body(res).await;
        assert_eq!(
            std::str::from_utf8(&body).unwrap(),
            "1\n00:00:00,000 --> 00:00:01,250\nhello\n\n2\n00:00:01,250 --> 00:00:04,250\nworld\n"
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(unix)]
    #[actix_web::test]
    async fn test_failed_transcription_keeps_queue_serviceable() {
        let dir = test_dir();
        let queue = QueueManager::new(None);
        let app = app!(&dir, FAILING_TOOL, queue.clone());

        let req = upload_request(&[Part::File("audio", "talk.wav", b"RIFF")]).to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(res).await;
        assert!(body["error"].as_str().unwrap().contains("no model"));

        let status = queue.status();
        assert!(!status.running);
        assert_eq!(status.waiting_count, 0);
        assert_eq!(upload_folders(&dir), 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[actix_web::test]
    async fn test_preflight_lists_methods() {
        let dir = test_dir();
        let app = app!(&dir, FAKE_TOOL, QueueManager::new(None));

        let req = test::TestRequest::default()
            .method(actix_web::http::Method::OPTIONS)
            .uri("/api/transcribe")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("Allow").unwrap(), "OPTIONS, POST");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[actix_web::test]
    async fn test_api_status_reports_configuration() {
        let dir = test_dir();
        let server = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            timeout: 480,
            keepalive: 480,
            workers: 2,
        };
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(QueueManager::new(Some(4))))
                .app_data(web::Data::new(transcriber(&dir, FAKE_TOOL)))
                .app_data(web::Data::new(handler_config(&dir)))
                .app_data(web::Data::new(server))
                .app_data(web::Data::new(AuthConfig {
                    enabled: false,
                    token: None,
                }))
                .service(api_status),
        )
        .await;

        let req = test::TestRequest::get().uri("/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["server"]["port"], 3000);
        assert_eq!(body["server"]["worker_number"], 2);
        assert_eq!(body["processing"]["command"], "sh");
        assert_eq!(body["processing"]["default_task"], "transcribe");
        assert_eq!(body["processing"]["default_output_format"], "json");
        assert_eq!(body["resources"]["max_waiting_jobs"], 4);
        assert_eq!(body["security"]["authorization_enabled"], false);
        assert_eq!(body["queue_state"]["running"], false);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
