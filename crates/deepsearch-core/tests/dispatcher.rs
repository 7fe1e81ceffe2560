use async_trait::async_trait;
use deepsearch_core::ai::{DeltaStream, GenerationProvider, StreamDelta};
use deepsearch_core::error::{GenerationError, SearchError};
use deepsearch_core::search::{SearchProvider, SearchRequest, SearchResult};
use deepsearch_core::state::{ChatMessage, ChatRole};
use deepsearch_core::{Dispatcher, SessionSnapshot, SubmitOutcome, Timeouts};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;

type DeltaSender = mpsc::UnboundedSender<Result<StreamDelta, GenerationError>>;

#[derive(Default)]
struct FakeSearch {
    results: Vec<SearchResult>,
    fail: bool,
    /// Queries equal to "slow" wait here before answering
    gate: Option<Arc<Notify>>,
    hang: bool,
    requests: Mutex<Vec<SearchRequest>>,
}

#[async_trait]
impl SearchProvider for FakeSearch {
    fn name(&self) -> &str {
        "fake"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, SearchError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.hang {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if request.query == "slow" {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
        }
        if self.fail {
            return Err(SearchError::Status {
                status: 500,
                message: "upstream exploded".to_string(),
            });
        }
        Ok(self.results.clone())
    }
}

enum Script {
    Channel(mpsc::UnboundedReceiver<Result<StreamDelta, GenerationError>>),
    Chunks(Vec<&'static str>),
    Fail(GenerationError),
}

struct FakeGenerator {
    name: &'static str,
    scripts: Mutex<VecDeque<Script>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeGenerator {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            scripts: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn channel(&self) -> DeltaSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().unwrap().push_back(Script::Channel(rx));
        tx
    }

    fn chunks(&self, chunks: Vec<&'static str>) {
        self.scripts.lock().unwrap().push_back(Script::Chunks(chunks));
    }

    fn fail(&self, err: GenerationError) {
        self.scripts.lock().unwrap().push_back(Script::Fail(err));
    }

    fn seen(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for FakeGenerator {
    fn model(&self) -> &str {
        self.name
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<DeltaStream, GenerationError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Chunks(Vec::new()));
        match script {
            Script::Channel(rx) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            Script::Chunks(chunks) => Ok(Box::pin(futures_util::stream::iter(
                chunks
                    .into_iter()
                    .map(|c| Ok::<_, GenerationError>(StreamDelta::Text(c.to_string())))
                    .collect::<Vec<_>>(),
            ))),
            Script::Fail(err) => Err(err),
        }
    }
}

fn source(n: usize) -> SearchResult {
    SearchResult {
        title: format!("Source {}", n),
        url: format!("https://example.com/{}", n),
        text: format!("Body of source {}", n),
        ..Default::default()
    }
}

fn dispatcher(search: FakeSearch, generator: Arc<FakeGenerator>) -> (Dispatcher, Arc<FakeSearch>) {
    dispatcher_with(search, generator, Timeouts::default())
}

fn dispatcher_with(
    search: FakeSearch,
    generator: Arc<FakeGenerator>,
    timeouts: Timeouts,
) -> (Dispatcher, Arc<FakeSearch>) {
    let search = Arc::new(search);
    let dispatcher = Dispatcher::new(search.clone(), generator, timeouts);
    (dispatcher, search)
}

async fn wait_for(
    dispatcher: &Dispatcher,
    pred: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = dispatcher.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = dispatcher.snapshot();
            if pred(&snapshot) {
                return snapshot;
            }
            rx.changed().await.expect("dispatcher dropped");
        }
    })
    .await
    .expect("condition not reached in time")
}

fn assistant_text(snapshot: &SessionSnapshot) -> Option<&str> {
    snapshot
        .messages
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::Assistant)
        .map(|m| m.content.as_str())
}

#[tokio::test]
async fn test_search_then_streamed_answer() {
    let generator = FakeGenerator::new("fake-r1");
    let tx = generator.channel();
    let (dispatcher, search) = dispatcher(
        FakeSearch {
            results: vec![SearchResult {
                title: "Answer".to_string(),
                url: "http://x".to_string(),
                text: "It is a number.".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        },
        generator.clone(),
    );

    let outcome = dispatcher.submit("What is 42?").await;
    assert_eq!(outcome, SubmitOutcome::Dispatched { turn: 1 });

    let snapshot = dispatcher.snapshot();
    assert!(!snapshot.state.is_searching);
    assert!(snapshot.state.is_generating);
    assert_eq!(snapshot.state.search_results.len(), 1);
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[0].role, ChatRole::System);
    assert!(snapshot.messages[0]
        .content
        .starts_with("Web Search Results:\n\nSource [1]:\nTitle: Answer\nURL: http://x\nContent: It is a number.\n---"));
    assert_eq!(snapshot.messages[1].role, ChatRole::User);
    assert_eq!(snapshot.messages[1].content, "What is 42?");
    assert_eq!(snapshot.visible_messages().count(), 1);

    let requests = search.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].previous_queries.is_empty());

    tx.send(Ok(StreamDelta::Text("<think>Step one. Step two.".into())))
        .unwrap();
    let snapshot = wait_for(&dispatcher, |s| assistant_text(s).is_some()).await;
    let parsed = snapshot.latest_answer().unwrap();
    assert_eq!(parsed.thinking, "Step one. Step two.");
    assert_eq!(parsed.final_response, "");
    assert!(!parsed.is_complete);
    assert!(snapshot.state.is_generating);

    tx.send(Ok(StreamDelta::Text(" Step three.</think>The answer is 42 [1].".into())))
        .unwrap();
    let snapshot = wait_for(&dispatcher, |s| !s.state.is_generating).await;
    let parsed = snapshot.latest_answer().unwrap();
    assert_eq!(parsed.thinking, "Step one. Step two. Step three.");
    assert_eq!(parsed.final_response, "The answer is 42 [1].");
    assert!(parsed.is_complete);

    drop(tx);
    let snapshot = wait_for(&dispatcher, |s| !s.streaming).await;
    assert!(snapshot.state.generation_error.is_none());
    assert_eq!(snapshot.messages.len(), 3);
    assert_eq!(
        snapshot.state.previous_queries.to_vec(),
        vec!["What is 42?".to_string()]
    );

    // The generator saw the injected context followed by the user query
    let seen = generator.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].len(), 2);
    assert_eq!(seen[0][0].role, ChatRole::System);
    assert_eq!(seen[0][1].content, "What is 42?");
}

#[tokio::test]
async fn test_search_failure_ends_turn() {
    let generator = FakeGenerator::new("fake");
    let (dispatcher, _) = dispatcher(
        FakeSearch {
            fail: true,
            ..Default::default()
        },
        generator.clone(),
    );

    let outcome = dispatcher.submit("anything").await;
    assert_eq!(outcome, SubmitOutcome::SearchFailed);

    let snapshot = dispatcher.snapshot();
    let error = snapshot.state.search_error.clone().unwrap();
    assert!(error.starts_with("Search failed"));
    assert!(error.contains("upstream exploded"));
    assert!(!snapshot.state.is_searching);
    assert!(!snapshot.state.is_generating);
    assert!(snapshot.messages.is_empty());
    assert!(snapshot.state.previous_queries.is_empty());
    assert!(generator.seen().is_empty());
}

#[tokio::test]
async fn test_blank_queries_are_ignored() {
    let generator = FakeGenerator::new("fake");
    let (dispatcher, search) = dispatcher(FakeSearch::default(), generator.clone());
    let rx = dispatcher.subscribe();

    assert_eq!(dispatcher.submit("").await, SubmitOutcome::Ignored);
    assert_eq!(dispatcher.submit("   \n\t").await, SubmitOutcome::Ignored);

    assert!(search.requests.lock().unwrap().is_empty());
    assert!(generator.seen().is_empty());
    assert!(!rx.has_changed().unwrap());
    let snapshot = dispatcher.snapshot();
    assert_eq!(snapshot.turn, 0);
    assert!(!snapshot.state.is_busy());
}

#[tokio::test]
async fn test_empty_results_inject_no_context() {
    let generator = FakeGenerator::new("fake");
    generator.chunks(vec!["Nothing found, but here is what I know."]);
    let (dispatcher, _) = dispatcher(FakeSearch::default(), generator.clone());

    assert_eq!(
        dispatcher.submit("obscure").await,
        SubmitOutcome::Dispatched { turn: 1 }
    );
    let snapshot = wait_for(&dispatcher, |s| !s.streaming).await;

    assert!(snapshot.messages.iter().all(|m| m.role != ChatRole::System));
    assert_eq!(generator.seen()[0].len(), 1);
    // No markers at all: the whole reply is the final answer
    let parsed = snapshot.latest_answer().unwrap();
    assert_eq!(parsed.final_response, "Nothing found, but here is what I know.");
    assert!(parsed.is_complete);
    assert!(!snapshot.state.is_generating);
}

#[tokio::test]
async fn test_previous_queries_keep_last_three() {
    let generator = FakeGenerator::new("fake");
    let (dispatcher, search) = dispatcher(
        FakeSearch {
            results: vec![source(1)],
            ..Default::default()
        },
        generator.clone(),
    );

    for query in ["q1", "q2", "q3", "q4", "q5"] {
        generator.chunks(vec!["ok"]);
        dispatcher.submit(query).await;
        wait_for(&dispatcher, |s| !s.streaming).await;
    }

    let requests = search.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 5);
    assert!(requests[0].previous_queries.is_empty());
    assert_eq!(requests[1].previous_queries, vec!["q1"]);
    assert_eq!(requests[4].previous_queries, vec!["q2", "q3", "q4"]);

    let snapshot = dispatcher.snapshot();
    assert_eq!(snapshot.state.previous_queries.to_vec(), vec!["q3", "q4", "q5"]);

    // Each turn appends a context message, the query and the answer
    assert_eq!(snapshot.messages.len(), 15);
    assert_eq!(generator.seen()[4].len(), 14);
}

#[tokio::test]
async fn test_generation_error_keeps_partial_output() {
    let generator = FakeGenerator::new("fake");
    let tx = generator.channel();
    let (dispatcher, _) = dispatcher(FakeSearch::default(), generator);

    dispatcher.submit("explain").await;
    tx.send(Ok(StreamDelta::Text("<think>partial".into()))).unwrap();
    tx.send(Err(GenerationError::Stream("connection reset".into())))
        .unwrap();

    let snapshot = wait_for(&dispatcher, |s| !s.streaming).await;
    let error = snapshot.state.generation_error.clone().unwrap();
    assert!(error.contains("connection reset"));
    assert!(!snapshot.state.is_generating);
    assert_eq!(assistant_text(&snapshot), Some("<think>partial"));

    let parsed = snapshot.latest_answer().unwrap();
    assert_eq!(parsed.thinking, "partial");
    assert!(!parsed.is_complete);
}

#[tokio::test]
async fn test_stream_that_fails_to_open() {
    let generator = FakeGenerator::new("fake");
    generator.fail(GenerationError::Status {
        status: 401,
        message: "bad key".into(),
    });
    let (dispatcher, _) = dispatcher(FakeSearch::default(), generator);

    dispatcher.submit("hello").await;
    let snapshot = wait_for(&dispatcher, |s| s.state.generation_error.is_some()).await;
    assert!(snapshot.state.generation_error.as_deref().unwrap().contains("401"));
    assert!(assistant_text(&snapshot).is_none());
}

#[tokio::test]
async fn test_reasoning_frames_do_not_touch_history() {
    let generator = FakeGenerator::new("fake");
    let tx = generator.channel();
    let (dispatcher, _) = dispatcher(FakeSearch::default(), generator);

    dispatcher.submit("hello").await;
    tx.send(Ok(StreamDelta::Reasoning("hidden".into()))).unwrap();
    tx.send(Ok(StreamDelta::Text("Hi!".into()))).unwrap();
    drop(tx);

    let snapshot = wait_for(&dispatcher, |s| !s.streaming).await;
    assert_eq!(assistant_text(&snapshot), Some("Hi!"));
}

#[tokio::test]
async fn test_leading_newline_keeps_generating() {
    let generator = FakeGenerator::new("fake");
    let tx = generator.channel();
    let (dispatcher, _) = dispatcher(FakeSearch::default(), generator);

    dispatcher.submit("hello").await;
    tx.send(Ok(StreamDelta::Text("\n".into()))).unwrap();
    wait_for(&dispatcher, |s| assistant_text(s).is_some()).await;
    assert!(dispatcher.snapshot().state.is_generating);

    tx.send(Ok(StreamDelta::Text("<think>still reasoning".into()))).unwrap();
    let snapshot = wait_for(&dispatcher, |s| assistant_text(s) == Some("\n<think>still reasoning")).await;
    let parsed = snapshot.latest_answer().unwrap();
    assert_eq!(parsed.thinking, "still reasoning");
    assert!(!parsed.is_complete);
    assert!(snapshot.state.is_generating);

    tx.send(Ok(StreamDelta::Text("</think>Done.".into()))).unwrap();
    let snapshot = wait_for(&dispatcher, |s| !s.state.is_generating).await;
    assert_eq!(snapshot.latest_answer().unwrap().final_response, "Done.");
    drop(tx);
}

#[tokio::test]
async fn test_short_reply_is_shown_once_stream_ends() {
    let generator = FakeGenerator::new("fake");
    generator.chunks(vec!["<"]);
    let (dispatcher, _) = dispatcher(FakeSearch::default(), generator);

    dispatcher.submit("hello").await;
    let snapshot = wait_for(&dispatcher, |s| !s.streaming).await;
    let parsed = snapshot.latest_answer().unwrap();
    assert_eq!(parsed.final_response, "<");
    assert!(parsed.is_complete);
    assert_eq!(dispatcher.latest_answer(), Some(parsed));
    assert!(!snapshot.state.is_generating);
}

#[tokio::test]
async fn test_newer_submission_supersedes_pending_search() {
    let gate = Arc::new(Notify::new());
    let generator = FakeGenerator::new("fake");
    generator.chunks(vec!["fast answer"]);
    let (dispatcher, search) = dispatcher(
        FakeSearch {
            results: vec![source(1)],
            gate: Some(gate.clone()),
            ..Default::default()
        },
        generator.clone(),
    );

    let slow = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.submit("slow").await })
    };
    wait_for(&dispatcher, |s| s.state.is_searching).await;
    assert_eq!(search.requests.lock().unwrap().len(), 1);

    assert_eq!(
        dispatcher.submit("fast").await,
        SubmitOutcome::Dispatched { turn: 2 }
    );
    gate.notify_one();
    assert_eq!(slow.await.unwrap(), SubmitOutcome::Superseded);

    let snapshot = wait_for(&dispatcher, |s| !s.streaming).await;
    let users: Vec<_> = snapshot
        .messages
        .iter()
        .filter(|m| m.role == ChatRole::User)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(users, vec!["fast"]);
    assert_eq!(snapshot.state.previous_queries.to_vec(), vec!["fast"]);
    assert_eq!(generator.seen().len(), 1);
}

#[tokio::test]
async fn test_newer_submission_stops_old_stream() {
    let generator = FakeGenerator::new("fake");
    let old = generator.channel();
    let new = generator.channel();
    let (dispatcher, _) = dispatcher(FakeSearch::default(), generator);

    dispatcher.submit("first").await;
    old.send(Ok(StreamDelta::Text("old answer".into()))).unwrap();
    wait_for(&dispatcher, |s| assistant_text(s) == Some("old answer")).await;

    assert_eq!(
        dispatcher.submit("second").await,
        SubmitOutcome::Dispatched { turn: 2 }
    );
    // The old stream task is aborted; its receiver may already be gone
    let _ = old.send(Ok(StreamDelta::Text(" stale".into())));
    new.send(Ok(StreamDelta::Text("new answer".into()))).unwrap();
    drop(new);

    let snapshot = wait_for(&dispatcher, |s| !s.streaming).await;
    let answers: Vec<_> = snapshot
        .messages
        .iter()
        .filter(|m| m.role == ChatRole::Assistant)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(answers, vec!["old answer", "new answer"]);
    assert!(snapshot.state.generation_error.is_none());
}

#[tokio::test]
async fn test_search_timeout() {
    let generator = FakeGenerator::new("fake");
    let (dispatcher, _) = dispatcher_with(
        FakeSearch {
            hang: true,
            ..Default::default()
        },
        generator,
        Timeouts {
            search: Duration::from_millis(50),
            generation: Duration::from_secs(5),
        },
    );

    assert_eq!(dispatcher.submit("hang").await, SubmitOutcome::SearchFailed);
    let error = dispatcher.snapshot().state.search_error.unwrap();
    assert!(error.starts_with("Search failed"));
    assert!(error.contains("timed out"));
}

#[tokio::test]
async fn test_generation_timeout() {
    let generator = FakeGenerator::new("fake");
    let tx = generator.channel();
    let (dispatcher, _) = dispatcher_with(
        FakeSearch::default(),
        generator,
        Timeouts {
            search: Duration::from_secs(5),
            generation: Duration::from_millis(50),
        },
    );

    dispatcher.submit("quiet").await;
    let snapshot = wait_for(&dispatcher, |s| !s.streaming).await;
    assert!(snapshot.state.generation_error.as_deref().unwrap().contains("timed out"));
    assert!(!snapshot.state.is_generating);
    drop(tx);
}

#[tokio::test]
async fn test_loading_dots_cycle_while_searching() {
    let gate = Arc::new(Notify::new());
    let generator = FakeGenerator::new("fake");
    let (dispatcher, _) = dispatcher(
        FakeSearch {
            gate: Some(gate.clone()),
            ..Default::default()
        },
        generator,
    );

    let pending = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.submit("slow").await })
    };
    wait_for(&dispatcher, |s| s.state.is_searching).await;

    for _ in 0..5 {
        dispatcher.tick();
    }
    let snapshot = dispatcher.snapshot();
    assert_eq!(snapshot.state.loading_dots, 1);
    assert_eq!(snapshot.state.loading_indicator(), ".");

    gate.notify_one();
    pending.await.unwrap();
    dispatcher.tick();
    assert_eq!(dispatcher.snapshot().state.loading_dots, 1);
}

#[tokio::test]
async fn test_set_generator_applies_to_next_turn() {
    let first = FakeGenerator::new("first");
    let second = FakeGenerator::new("second");
    second.chunks(vec!["from second"]);
    let (dispatcher, _) = dispatcher(FakeSearch::default(), first.clone());

    assert_eq!(dispatcher.generator().model(), "first");
    dispatcher.set_generator(second.clone());
    assert_eq!(dispatcher.generator().model(), "second");

    dispatcher.submit("hello").await;
    let snapshot = wait_for(&dispatcher, |s| !s.streaming).await;
    assert_eq!(assistant_text(&snapshot), Some("from second"));
    assert!(first.seen().is_empty());
    assert_eq!(second.seen().len(), 1);
}
