mod common;

use common::fixtures::{
    HIDDEN_SIZE, NLI_LABELS, TAGGER_LABELS, TOPIC_LABELS, bert_model_dir, marian_model_dir,
};
use common::scripted::ScriptedBackend;
use common::{scripted_registry, start_rpc};
use std::time::Duration;
use uni_tasks::api::{
    AggregationStrategy, GenerationOptions, PoolingStrategy, QuestionAnsweringOptions,
    TaskDescriptor, TaskKind, TextClassificationParameters, TokenClassificationParameters,
    ZeroShotParameters,
};
use uni_tasks::client::{
    QuestionAnsweringClient, RpcChannel, TextClassificationClient, TextEncodingClient,
    TextGenerationClient, TokenClassificationClient, ZeroShotClassificationClient,
};
use uni_tasks::error::TaskError;
use uni_tasks::protocol::Code;
use uni_tasks::registry::LoadedTask;
use uni_tasks::traits::{
    QuestionAnswering, TextClassification, TextEncoding, TextGeneration, TokenClassification,
    ZeroShotClassification,
};

fn load(kind: TaskKind, dir: &std::path::Path, backend: ScriptedBackend) -> LoadedTask {
    scripted_registry(backend)
        .load_task(&TaskDescriptor::new(kind, dir))
        .unwrap()
}

#[tokio::test]
async fn encoding_client_matches_in_process_result() {
    let dir = bert_model_dir(&[]);
    let task = load(TaskKind::TextEncoding, dir.path(), ScriptedBackend::new());
    let LoadedTask::TextEncoding(local) = task.clone() else {
        panic!("expected a text encoding task");
    };
    let server = start_rpc(task).await;

    let client = TextEncodingClient::new(RpcChannel::new(server.address.to_string()));
    let remote = client.encode("The game", PoolingStrategy::Mean).await.unwrap();
    let expected = local.encode("The game", PoolingStrategy::Mean).await.unwrap();
    assert_eq!(remote, expected);
    assert_eq!(remote.vector.len(), HIDDEN_SIZE);
}

#[tokio::test]
async fn every_task_is_reachable_through_its_stub() {
    let bert = bert_model_dir(TAGGER_LABELS);
    let server = start_rpc(load(
        TaskKind::TokenClassification,
        bert.path(),
        ScriptedBackend::new(),
    ))
    .await;
    let entities = TokenClassificationClient::new(RpcChannel::new(server.address.to_string()))
        .classify(
            "Playing the game",
            &TokenClassificationParameters {
                aggregation_strategy: AggregationStrategy::Simple,
            },
        )
        .await
        .unwrap()
        .entities;
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].text, "Playing");

    let server = start_rpc(load(
        TaskKind::QuestionAnswering,
        bert.path(),
        ScriptedBackend::new(),
    ))
    .await;
    let answers = QuestionAnsweringClient::new(RpcChannel::new(server.address.to_string()))
        .answer(
            "Who wrote the book?",
            "The book was written by Jane Austen.",
            &QuestionAnsweringOptions::default(),
        )
        .await
        .unwrap()
        .answers;
    assert_eq!(answers[0].text, "Jane Austen");

    let nli = bert_model_dir(NLI_LABELS);
    let server = start_rpc(load(
        TaskKind::ZeroShotClassification,
        nli.path(),
        ScriptedBackend::new(),
    ))
    .await;
    let classes = ZeroShotClassificationClient::new(RpcChannel::new(server.address.to_string()))
        .classify(
            "Playing the game",
            &ZeroShotParameters {
                candidate_labels: vec!["cooking".into(), "sports".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .classes;
    assert_eq!(classes[0].label, "sports");

    let marian = marian_model_dir();
    let server = start_rpc(load(
        TaskKind::TextGeneration,
        marian.path(),
        ScriptedBackend::new(),
    ))
    .await;
    let texts = TextGenerationClient::new(RpcChannel::new(server.address.to_string()))
        .generate("hello world", &GenerationOptions::default())
        .await
        .unwrap()
        .texts;
    assert_eq!(texts, vec!["hello world"]);
}

#[tokio::test]
async fn other_services_are_unimplemented() {
    let dir = bert_model_dir(&[]);
    let server = start_rpc(load(TaskKind::TextEncoding, dir.path(), ScriptedBackend::new())).await;

    let client = QuestionAnsweringClient::new(RpcChannel::new(server.address.to_string()));
    let err = client
        .answer("Who?", "Jane Austen.", &QuestionAnsweringOptions::default())
        .await
        .unwrap_err();
    match err {
        TaskError::Status { code, message } => {
            assert_eq!(code, Code::Unimplemented);
            assert_eq!(
                message,
                "Unsupported: questionanswering.v1.QuestionAnsweringService is unsupported for this server instance"
            );
        }
        other => panic!("expected a status error, got {other:?}"),
    }
}

#[tokio::test]
async fn text_classification_client_matches_in_process_result() {
    let dir = bert_model_dir(TOPIC_LABELS);
    let task = load(TaskKind::TextClassification, dir.path(), ScriptedBackend::new());
    let LoadedTask::TextClassification(local) = task.clone() else {
        panic!("expected a text classification task");
    };
    let server = start_rpc(task).await;

    let parameters = TextClassificationParameters { top_k: Some(2) };
    let text = "This game is about sports";
    let expected = local.classify(text, &parameters).await.unwrap();
    let remote = TextClassificationClient::new(RpcChannel::new(server.address.to_string()))
        .classify(text, &parameters)
        .await
        .unwrap();
    assert_eq!(remote, expected);
    assert_eq!(remote.classes.len(), 2);
    assert_eq!(remote.classes[0].label, "sports");
}

#[tokio::test]
async fn request_errors_carry_their_code() {
    let dir = bert_model_dir(NLI_LABELS);
    let server = start_rpc(load(
        TaskKind::ZeroShotClassification,
        dir.path(),
        ScriptedBackend::new(),
    ))
    .await;

    let client = ZeroShotClassificationClient::new(RpcChannel::new(server.address.to_string()));
    let err = client
        .classify("Playing the game", &ZeroShotParameters::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TaskError::Status {
            code: Code::InvalidArgument,
            ..
        }
    ));
}

#[tokio::test]
async fn slow_backend_hits_the_deadline() {
    let dir = bert_model_dir(&[]);
    let backend = ScriptedBackend::with_delay(Duration::from_secs(2));
    let server = start_rpc(load(TaskKind::TextEncoding, dir.path(), backend)).await;

    let channel =
        RpcChannel::new(server.address.to_string()).with_deadline(Duration::from_millis(100));
    let client = TextEncodingClient::new(channel);
    let err = client
        .encode("The game", PoolingStrategy::Cls)
        .await
        .unwrap_err();
    // The client timer and the server deadline race; either side may report it.
    assert!(
        matches!(
            err,
            TaskError::Timeout
                | TaskError::Status {
                    code: Code::DeadlineExceeded,
                    ..
                }
        ),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let client = TextEncodingClient::new(RpcChannel::new(address.to_string()));
    let err = client
        .encode("The game", PoolingStrategy::Cls)
        .await
        .unwrap_err();
    assert!(err.is_transport(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn one_connection_serves_sequential_frames() {
    use futures::{SinkExt, StreamExt};
    use tokio_util::bytes::Bytes;
    use tokio_util::codec::Framed;
    use uni_tasks::protocol::{EncodeRequest, RpcRequest, RpcResponse, frame_codec, to_payload};

    let dir = bert_model_dir(&[]);
    let server = start_rpc(load(TaskKind::TextEncoding, dir.path(), ScriptedBackend::new())).await;

    let stream = tokio::net::TcpStream::connect(server.address).await.unwrap();
    let mut framed = Framed::new(stream, frame_codec());
    for text in ["the game", "playing"] {
        let request = RpcRequest {
            service: TaskKind::TextEncoding.service_name().to_string(),
            method: "Encode".to_string(),
            deadline_ms: None,
            payload: to_payload(&EncodeRequest {
                input: text.to_string(),
                pooling_strategy: PoolingStrategy::Cls,
            })
            .unwrap(),
        };
        framed
            .send(Bytes::from(serde_json::to_vec(&request).unwrap()))
            .await
            .unwrap();
        let frame = framed.next().await.unwrap().unwrap();
        let response: RpcResponse = serde_json::from_slice(&frame).unwrap();
        assert_eq!(response.code, Code::Ok);
    }

    framed.send(Bytes::from_static(b"not json")).await.unwrap();
    let frame = framed.next().await.unwrap().unwrap();
    let response: RpcResponse = serde_json::from_slice(&frame).unwrap();
    assert_eq!(response.code, Code::InvalidArgument);
}

#[tokio::test]
async fn peer_disconnect_abandons_the_call() {
    use futures::SinkExt;
    use tokio_util::bytes::Bytes;
    use tokio_util::codec::Framed;
    use uni_tasks::protocol::{EncodeRequest, RpcRequest, frame_codec, to_payload};

    let dir = bert_model_dir(&[]);
    let backend = ScriptedBackend::with_delay(Duration::from_millis(500));
    let server = start_rpc(load(TaskKind::TextEncoding, dir.path(), backend.clone())).await;

    let stream = tokio::net::TcpStream::connect(server.address).await.unwrap();
    let mut framed = Framed::new(stream, frame_codec());
    let request = RpcRequest {
        service: TaskKind::TextEncoding.service_name().to_string(),
        method: "Encode".to_string(),
        deadline_ms: None,
        payload: to_payload(&EncodeRequest {
            input: "the game".to_string(),
            pooling_strategy: PoolingStrategy::Cls,
        })
        .unwrap(),
    };
    framed
        .send(Bytes::from(serde_json::to_vec(&request).unwrap()))
        .await
        .unwrap();

    // Wait until the forward pass has started, then hang up.
    while backend.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    drop(framed);

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(backend.calls(), 1);
    assert_eq!(backend.completed(), 0, "the forward pass ran to completion");
}

#[tokio::test]
async fn shutdown_abandons_in_flight_calls() {
    let dir = bert_model_dir(&[]);
    let backend = ScriptedBackend::with_delay(Duration::from_secs(5));
    let server = start_rpc(load(TaskKind::TextEncoding, dir.path(), backend.clone())).await;

    let client = TextEncodingClient::new(RpcChannel::new(server.address.to_string()));
    let call = tokio::spawn(async move { client.encode("The game", PoolingStrategy::Cls).await });
    while backend.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    drop(server);

    let result = tokio::time::timeout(Duration::from_secs(1), call)
        .await
        .expect("connection was not closed on shutdown")
        .unwrap();
    assert!(result.is_err());
    assert_eq!(backend.completed(), 0);
}
