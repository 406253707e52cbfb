//! End-to-end tests for the streaming answer pipeline
//!
//! Drives whole turns through the public API with scripted byte streams
//! instead of a live answering service.

use std::convert::Infallible;
use std::sync::Arc;

use futures::{Stream, StreamExt};

use kbchat::config::{ApiConfig, ModeSettings};
use kbchat::message::StepKind;
use kbchat::session::throttle::{InlineScheduler, ManualScheduler};
use kbchat::session::{ChatMode, ChatSessions, SessionController, TurnHandle};
use kbchat::stream::{AnswerClient, pump};
use kbchat::types::Role;

fn test_controller(mode: ChatMode, scheduler: Arc<ManualScheduler>) -> SessionController {
    SessionController::with_scheduler(
        mode,
        ModeSettings::default(),
        AnswerClient::new(ApiConfig::new("http://127.0.0.1:1/api/v1")),
        scheduler,
    )
}

fn inline_controller(mode: ChatMode) -> SessionController {
    SessionController::with_scheduler(
        mode,
        ModeSettings::default(),
        AnswerClient::new(ApiConfig::new("http://127.0.0.1:1/api/v1")),
        Arc::new(InlineScheduler),
    )
}

fn scripted(chunks: &[&'static [u8]]) -> impl Stream<Item = Result<&'static [u8], Infallible>> {
    futures::stream::iter(chunks.iter().map(|chunk| Ok(*chunk)).collect::<Vec<_>>())
}

async fn run_turn(session: &SessionController, text: &str, chunks: &[&'static [u8]]) {
    let TurnHandle {
        mut sink, cancel, ..
    } = session.begin_turn(text).expect("turn accepted");
    pump(scripted(chunks), cancel, &mut sink).await;
}

mod completion_tests {
    use super::*;

    #[tokio::test]
    async fn untagged_scenario_reaches_exact_content() {
        let session = inline_controller(ChatMode::Normal);
        run_turn(
            &session,
            "what is the answer?",
            &[
                b"data: {\"step\":\"thinking\",\"content\":\"parsing intent\"}\n",
                b"data: {\"content\":\"The answer is \"}\n",
                b"data: {\"content\":\"42.\"}\n",
                b"data: {}\n",
            ],
        )
        .await;

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        let answer = &messages[1];
        assert_eq!(answer.steps.len(), 1);
        assert_eq!(answer.steps[0].kind, StepKind::IntentAnalysis);
        assert_eq!(answer.content, "The answer is 42.");
        assert!(!answer.streaming);
        assert!(!session.generation_in_progress());
    }

    #[tokio::test]
    async fn content_is_complete_even_when_no_intermediate_commit_fires() {
        // A scheduler whose quantum never arrives: every intermediate
        // commit is coalesced away and only the terminal flush runs.
        let scheduler = Arc::new(ManualScheduler::default());
        let session = test_controller(ChatMode::Normal, Arc::clone(&scheduler));

        run_turn(
            &session,
            "stream fast",
            &[
                b"data: {\"content\":\"a\"}\ndata: {\"content\":\"b\"}\ndata: {\"content\":\"c\"}\n",
                b"data: {\"content\":\"d\"}\ndata: {}\n",
            ],
        )
        .await;

        assert_eq!(session.messages()[1].content, "abcd");
        assert!(!session.generation_in_progress());

        // The coalesced commit left pending must stay inert.
        scheduler.run_pending();
        assert_eq!(session.messages()[1].content, "abcd");
    }

    #[tokio::test]
    async fn split_chunks_produce_the_same_turn() {
        let session = inline_controller(ChatMode::Normal);
        run_turn(
            &session,
            "split me",
            // The record boundary falls inside a line and inside the
            // multi-byte character in the payload.
            &[
                b"data: {\"con",
                b"tent\":\"caf",
                b"\xc3",
                b"\xa9\"}\ndata: {}\n",
            ],
        )
        .await;

        assert_eq!(session.messages()[1].content, "café");
        assert!(!session.generation_in_progress());
    }
}

mod citation_tests {
    use super::*;

    #[tokio::test]
    async fn rerank_pass_keeps_both_lists_distinct() {
        let session = inline_controller(ChatMode::Agent);
        run_turn(
            &session,
            "cite me",
            &[
                b"event: rag\ndata: {\"citations\":[{\"score\":0.8,\"fileName\":\"a.pdf\",\"kb_name\":\"kb\",\"location\":\"page 1\"}]}\n",
                b"event: rag\ndata: {\"citations\":[{\"score\":0.8,\"rerank_score\":0.97,\"fileName\":\"a.pdf\",\"kb_name\":\"kb\",\"location\":\"page 1\"}],\"original_citations\":[{\"score\":0.8,\"fileName\":\"a.pdf\",\"kb_name\":\"kb\",\"location\":\"page 1\"},{\"score\":0.5,\"fileName\":\"b.pdf\",\"kb_name\":\"kb\",\"location\":\"page 9\"}]}\n",
                b"data: {\"content\":\"answer\"}\ndata: {}\n",
            ],
        )
        .await;

        let answer = &session.messages()[1];
        assert_eq!(answer.citations.len(), 2);
        assert!(answer.citations.iter().all(|c| c.rerank_score.is_none()));

        let rerank = answer.rerank_citations.as_ref().expect("rerank pass");
        assert_eq!(rerank.len(), 1);
        assert_eq!(rerank[0].rerank_score, Some(0.97));
        assert_eq!(answer.content, "answer");
    }
}

mod isolation_tests {
    use super::*;

    #[tokio::test]
    async fn each_mode_sees_only_its_own_stream() {
        let sessions = ChatSessions {
            normal: inline_controller(ChatMode::Normal),
            agent: inline_controller(ChatMode::Agent),
        };

        // A turn starts in agent mode, then the user switches to normal
        // mode and submits there while the first stream is still open.
        let agent_turn = sessions.agent.begin_turn("agent question").expect("accepted");
        let normal_turn = sessions
            .normal
            .begin_turn("normal question")
            .expect("accepted");

        let TurnHandle {
            mut sink, cancel, ..
        } = normal_turn;
        pump(
            scripted(&[b"data: {\"content\":\"normal answer\"}\ndata: {}\n"]),
            cancel,
            &mut sink,
        )
        .await;

        let TurnHandle {
            mut sink, cancel, ..
        } = agent_turn;
        pump(
            scripted(&[
                b"data: {\"step\":\"thinking\",\"content\":\"x\"}\ndata: {\"content\":\"agent answer\"}\ndata: {}\n",
            ]),
            cancel,
            &mut sink,
        )
        .await;

        let normal_answer = &sessions.normal.messages()[1];
        assert_eq!(normal_answer.content, "normal answer");
        assert!(normal_answer.steps.is_empty());

        let agent_answer = &sessions.agent.messages()[1];
        assert_eq!(agent_answer.content, "agent answer");
        assert_eq!(agent_answer.steps.len(), 1);
    }

    #[tokio::test]
    async fn error_in_one_mode_leaves_the_other_in_flight() {
        let sessions = ChatSessions {
            normal: inline_controller(ChatMode::Normal),
            agent: inline_controller(ChatMode::Agent),
        };

        let _agent_turn = sessions.agent.begin_turn("still running").expect("accepted");
        run_turn(
            &sessions.normal,
            "will fail",
            &[b"event: error\ndata: {\"message\":\"model unavailable\"}\n"],
        )
        .await;

        assert!(!sessions.normal.generation_in_progress());
        assert_eq!(
            sessions.normal.messages()[1].error.as_deref(),
            Some("model unavailable")
        );
        assert!(sessions.agent.generation_in_progress());
    }
}

mod gating_tests {
    use super::*;

    #[tokio::test]
    async fn submitting_while_in_progress_leaves_history_unchanged() {
        let session = inline_controller(ChatMode::Normal);
        let _turn = session.begin_turn("first").expect("accepted");
        let before = session.messages().len();

        assert!(session.begin_turn("second").is_none());
        assert_eq!(session.messages().len(), before);
    }
}

mod cancellation_tests {
    use super::*;

    #[tokio::test]
    async fn cancel_mid_stream_frees_the_mode_and_keeps_committed_text() {
        let session = inline_controller(ChatMode::Agent);
        let TurnHandle {
            mut sink, cancel, ..
        } = session.begin_turn("long question").expect("accepted");

        // A stream that delivers one delta and then stays open forever.
        let never_ending = scripted(&[b"data: {\"content\":\"committed\"}\n" as &[u8]])
            .chain(futures::stream::pending());
        let worker = tokio::spawn(async move {
            pump(never_ending, cancel, &mut sink).await;
        });

        // Wait until the delta is visible, then cancel.
        loop {
            if session.messages()[1].content == "committed" {
                break;
            }
            tokio::task::yield_now().await;
        }
        session.cancel();

        assert!(!session.generation_in_progress());
        worker.await.expect("pump stops after cancellation");

        let answer = &session.messages()[1];
        assert_eq!(answer.content, "committed");
        assert!(!answer.streaming);
        assert!(answer.error.is_none());

        // The mode accepts a new submission right away.
        assert!(session.begin_turn("next question").is_some());
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_service_fails_the_turn_exactly_once() {
        let session = inline_controller(ChatMode::Normal);
        let TurnHandle {
            request,
            mut sink,
            cancel,
        } = session.begin_turn("hello?").expect("accepted");

        // Port 1 refuses the connection before any frame is decoded.
        AnswerClient::new(ApiConfig::new("http://127.0.0.1:1/api/v1"))
            .stream_answer(&request, cancel, &mut sink)
            .await;

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        let answer = &messages[1];
        assert_eq!(answer.content, kbchat::session::GENERATION_FAILED);
        assert!(answer.error.is_some());
        assert!(!answer.streaming);
        assert!(!session.generation_in_progress());
    }

    #[tokio::test]
    async fn non_success_status_fails_the_turn_before_any_frame() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 11\r\nconnection: close\r\n\r\nunavailable",
                    )
                    .await;
            }
        });

        let session = inline_controller(ChatMode::Normal);
        let TurnHandle {
            request,
            mut sink,
            cancel,
        } = session.begin_turn("hello?").expect("accepted");
        AnswerClient::new(ApiConfig::new(format!("http://{addr}/api/v1")))
            .stream_answer(&request, cancel, &mut sink)
            .await;

        let answer = &session.messages()[1];
        assert_eq!(answer.content, kbchat::session::GENERATION_FAILED);
        let error = answer.error.as_deref().expect("error recorded");
        assert!(error.contains("503"), "error was: {error}");
        assert!(!session.generation_in_progress());
    }

    #[tokio::test]
    async fn unterminated_stream_completes_instead_of_sticking() {
        let session = inline_controller(ChatMode::Normal);
        run_turn(
            &session,
            "question",
            &[b"data: {\"content\":\"half an answer\"}\n"],
        )
        .await;

        let answer = &session.messages()[1];
        assert_eq!(answer.content, "half an answer");
        assert!(answer.error.is_none());
        assert!(!answer.streaming);
        assert!(!session.generation_in_progress());
    }
}

mod rewrite_tests {
    use super::*;

    #[tokio::test]
    async fn rewrite_unwraps_the_envelope() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let body = r#"{"code":200,"message":"success","data":{"rewritten_query":"what changed in release 2.0?"}}"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        let client = AnswerClient::new(ApiConfig::new(format!("http://{addr}/api/v1")));
        let rewritten = client.rewrite("what changed").await.expect("rewritten");
        assert_eq!(rewritten, "what changed in release 2.0?");
    }
}

mod persistence_tests {
    use super::*;
    use kbchat::persist::SessionStore;

    #[tokio::test]
    async fn snapshots_survive_a_store_round_trip() {
        let session = inline_controller(ChatMode::Agent);
        run_turn(
            &session,
            "remember me",
            &[b"data: {\"content\":\"saved answer\"}\ndata: {}\n"],
        )
        .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::open(dir.path());
        store.save(&session.snapshot()).expect("save");

        let restored = inline_controller(ChatMode::Agent);
        let snapshot = store
            .load(ChatMode::Agent)
            .expect("load")
            .expect("snapshot present");
        assert!(restored.restore(snapshot));

        let messages = restored.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "saved answer");
        assert!(!restored.generation_in_progress());
    }
}
