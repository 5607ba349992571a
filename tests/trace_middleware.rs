use std::sync::Arc;

use bytes::Bytes;
use regex::Regex;
use serde_json::Value;
use tsu_trace::{Config, MemorySink, Request, Response, TraceMiddleware};

/// Echoes what the downstream handler saw: the trace header and the
/// request-scoped trace ID.
async fn echo(req: Request) -> Response {
    let header = req.header("x-trace-id").unwrap_or("-").to_owned();
    let scoped = req.trace_id().unwrap_or("-").to_owned();
    Response::json(serde_json::json!({ "header": header, "scoped": scoped }).to_string())
}

fn traced(config: &Config) -> (TraceMiddleware, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let mw = TraceMiddleware::new(config, "trace", echo)
        .unwrap()
        .with_sink(sink.clone());
    (mw, sink)
}

fn request(builder: http::request::Builder) -> Request {
    Request::new(builder.body(Bytes::new()).unwrap())
        .with_remote_addr("1.2.3.4:5678".parse().unwrap())
}

fn parse(line: &str) -> Value {
    serde_json::from_str(line).unwrap()
}

#[tokio::test]
async fn request_without_header_gets_generated_id_everywhere() {
    let (mw, sink) = traced(&Config::default());
    let res = mw.handle(request(http::Request::get("/health"))).await;

    let lines = sink.lines();
    assert_eq!(lines.len(), 2);
    let (start, end) = (parse(&lines[0]), parse(&lines[1]));

    let id = start["trace_id"].as_str().unwrap().to_owned();
    assert!(Regex::new("^[0-9a-f]{32}$").unwrap().is_match(&id));
    assert_eq!(end["trace_id"], id.as_str());
    assert_eq!(start["method"], "GET");
    assert_eq!(start["path"], "/health");
    assert_eq!(start["remote_addr"], "1.2.3.4:5678");
    assert!(start.get("response_time").is_none());
    assert!(Regex::new(r"^\d+ ms$").unwrap().is_match(end["response_time"].as_str().unwrap()));
    assert_eq!(end["status"], "ok");

    let seen = parse(std::str::from_utf8(res.body()).unwrap());
    assert_eq!(seen["header"], id.as_str());
    assert_eq!(seen["scoped"], id.as_str());
    assert_eq!(res.headers()["x-trace-id"], id.as_str());
}

#[tokio::test]
async fn upstream_trace_id_is_reused_verbatim() {
    let (mw, sink) = traced(&Config::default());
    let res = mw
        .handle(request(http::Request::get("/orders").header("X-Trace-Id", "abc123")))
        .await;

    for line in sink.lines() {
        assert_eq!(parse(&line)["trace_id"], "abc123");
    }
    let seen = parse(std::str::from_utf8(res.body()).unwrap());
    assert_eq!(seen["header"], "abc123");
    assert_eq!(seen["scoped"], "abc123");
    assert_eq!(res.headers()["x-trace-id"], "abc123");
}

#[tokio::test]
async fn non_ascii_upstream_trace_id_is_kept() {
    async fn raw(req: Request) -> Response {
        let header = req.headers().get("x-trace-id").map(|v| v.as_bytes().to_vec());
        let scoped = req.trace_id().unwrap_or("-").to_owned();
        Response::json(serde_json::json!({ "header": header, "scoped": scoped }).to_string())
    }

    let sink = Arc::new(MemorySink::new());
    let mw = TraceMiddleware::new(&Config::default(), "trace", raw)
        .unwrap()
        .with_sink(sink.clone());

    let upstream = http::HeaderValue::from_bytes(b"caf\xC3\xA9-1").unwrap();
    let mut req = request(http::Request::get("/"));
    req.headers_mut().insert("x-trace-id", upstream.clone());
    req.headers_mut()
        .insert("user-agent", http::HeaderValue::from_bytes("agent-é".as_bytes()).unwrap());
    let res = mw.handle(req).await;

    for line in sink.lines() {
        let record = parse(&line);
        assert_eq!(record["trace_id"], "café-1");
        assert_eq!(record["user_agent"], "agent-é");
    }
    let seen = parse(std::str::from_utf8(res.body()).unwrap());
    assert_eq!(seen["header"], serde_json::json!(b"caf\xC3\xA9-1".to_vec()));
    assert_eq!(seen["scoped"], "café-1");
    assert_eq!(res.headers()["x-trace-id"], upstream);
}

#[tokio::test]
async fn empty_upstream_header_is_replaced() {
    let (mw, sink) = traced(&Config::default());
    let res = mw
        .handle(request(http::Request::get("/").header("X-Trace-Id", "")))
        .await;

    let id = parse(&sink.lines()[0])["trace_id"].as_str().unwrap().to_owned();
    assert_eq!(id.len(), 32);
    let seen = parse(std::str::from_utf8(res.body()).unwrap());
    assert_eq!(seen["header"], id.as_str());
}

#[tokio::test]
async fn hostile_user_agent_still_yields_single_line_json() {
    let (mw, sink) = traced(&Config::default());
    let agent = "curl/8 \"quoted\"\t\\path";
    let req = request(
        http::Request::post("/upload")
            .header("user-agent", agent)
            .header("x-forwarded-for", "10.0.0.1, 10.0.0.2"),
    );
    mw.handle(req).await;

    for line in sink.lines() {
        assert!(!line.contains('\n'));
        let record = parse(&line);
        assert_eq!(record["user_agent"], agent);
        assert_eq!(record["x_forwarded_for"], "10.0.0.1, 10.0.0.2");
        assert_eq!(record["method"], "POST");
    }
}

#[tokio::test]
async fn downstream_response_header_wins() {
    async fn sets_own(_req: Request) -> Response {
        Response::builder().header("x-trace-id", "from-app").text("done")
    }

    let sink = Arc::new(MemorySink::new());
    let mw = TraceMiddleware::new(&Config::default(), "trace", sets_own)
        .unwrap()
        .with_sink(sink.clone());
    let res = mw.handle(request(http::Request::get("/"))).await;

    assert_eq!(res.headers().get_all("x-trace-id").iter().count(), 1);
    assert_eq!(res.headers()["x-trace-id"], "from-app");
    assert_eq!(res.body().as_ref(), b"done");
}

#[tokio::test]
async fn panicking_downstream_still_logs_completion() {
    async fn boom(_req: Request) -> Response {
        panic!("downstream exploded");
    }

    let sink = Arc::new(MemorySink::new());
    let mw = TraceMiddleware::new(&Config::default(), "trace", boom)
        .unwrap()
        .with_sink(sink.clone());

    let req = request(http::Request::get("/explode"));
    let joined = tokio::spawn(async move { mw.handle(req).await }).await;
    assert!(joined.err().unwrap().is_panic());

    let lines = sink.lines();
    assert_eq!(lines.len(), 2);
    let (start, end) = (parse(&lines[0]), parse(&lines[1]));
    assert_eq!(start["trace_id"], end["trace_id"]);
    assert_eq!(end["status"], "error");
    assert!(end["response_time"].as_str().unwrap().ends_with(" ms"));
}

#[tokio::test]
async fn middleware_nests_as_a_handler() {
    let inner_sink = Arc::new(MemorySink::new());
    let outer_sink = Arc::new(MemorySink::new());
    let inner = TraceMiddleware::new(&Config::default(), "inner", echo)
        .unwrap()
        .with_sink(inner_sink.clone());
    let outer = TraceMiddleware::new(&Config::default(), "outer", inner)
        .unwrap()
        .with_sink(outer_sink.clone());

    outer.handle(request(http::Request::get("/nested"))).await;

    let outer_id = parse(&outer_sink.lines()[0])["trace_id"].clone();
    let inner_id = parse(&inner_sink.lines()[0])["trace_id"].clone();
    assert_eq!(outer_id, inner_id);
}

#[tokio::test]
async fn concurrent_requests_keep_their_own_ids() {
    let (mw, sink) = traced(&Config::default());

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..32 {
        let mw = mw.clone();
        tasks.spawn(async move {
            let id = format!("req-{i}");
            let res = mw
                .handle(request(http::Request::get("/").header("X-Trace-Id", id.as_str())))
                .await;
            assert_eq!(res.headers()["x-trace-id"], id.as_str());
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    let lines = sink.lines();
    assert_eq!(lines.len(), 64);
    for i in 0..32 {
        let id = format!("req-{i}");
        let count = lines.iter().filter(|l| parse(l)["trace_id"] == id.as_str()).count();
        assert_eq!(count, 2);
    }
}
