use criterion::{black_box, criterion_group, criterion_main, Criterion};

use agentwire::config::SegmenterConfig;
use agentwire::normalize::normalize_tool_result;
use agentwire::segment::{SegmentContext, Segmenter};
use agentwire::stream::FrameDecoder;

fn legacy_message() -> String {
    let mut text = String::new();
    for i in 0..16 {
        text.push_str("Some narration before the call number ");
        text.push_str(&i.to_string());
        text.push_str(". <execute-command>cargo build --release</execute-command> and after ");
        text.push_str("<create-file file_path=\"src/lib.rs\">fn main() {}\n</create-file>\n");
    }
    text
}

fn consolidated_message() -> String {
    let mut text = String::from("Planning done, running the batch now.\n");
    for _ in 0..8 {
        text.push_str(
            "<function_calls>\
             <invoke name=\"web_search\"><parameter name=\"query\">rust streaming sse decoder</parameter></invoke>\
             <invoke name=\"crawl_webpage\"><parameter name=\"url\">https://example.com</parameter></invoke>\
             </function_calls>\nIntermediate commentary.\n",
        );
    }
    text
}

fn transcript() -> String {
    let mut raw = String::new();
    for i in 0..64 {
        raw.push_str("data: {\"type\":\"thought\",\"content\":\"chunk number ");
        raw.push_str(&i.to_string());
        raw.push_str(" with some payload text\"}\n\n");
    }
    raw
}

fn bench_segmenter(c: &mut Criterion) {
    let segmenter = Segmenter::new(SegmenterConfig::default()).unwrap();
    let legacy = legacy_message();
    let consolidated = consolidated_message();
    let ctx = SegmentContext::finalized("bench");

    c.bench_function("segment_legacy", |b| {
        b.iter(|| segmenter.segment(black_box(&legacy), &ctx));
    });
    c.bench_function("segment_consolidated", |b| {
        b.iter(|| segmenter.segment(black_box(&consolidated), &ctx));
    });

    let streaming = &legacy[..legacy.len() / 2];
    let streaming_ctx = SegmentContext::streaming("bench");
    c.bench_function("segment_streaming_partial", |b| {
        b.iter(|| segmenter.segment(black_box(streaming), &streaming_ctx));
    });
}

fn bench_normalizer(c: &mut Criterion) {
    let envelope = serde_json::json!({
        "tool_execution": {
            "function_name": "web_search",
            "xml_tag_name": "web-search",
            "arguments": { "query": "rust" },
            "result": { "success": true, "output": "ten results, truncated" }
        }
    });
    let nested = serde_json::json!({
        "role": "tool",
        "content": {
            "tool_name": "execute-command",
            "result": { "success": false, "output": "exit status 1" }
        }
    });

    c.bench_function("normalize_execution_envelope", |b| {
        b.iter(|| normalize_tool_result(black_box(&envelope)));
    });
    c.bench_function("normalize_message_envelope", |b| {
        b.iter(|| normalize_tool_result(black_box(&nested)));
    });
}

fn bench_frame_decoder(c: &mut Criterion) {
    let raw = transcript();
    c.bench_function("frame_decoder_whole_transcript", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new();
            let frames = decoder.feed(black_box(&raw));
            black_box(frames)
        });
    });
    c.bench_function("frame_decoder_small_chunks", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new();
            let mut out = Vec::new();
            for chunk in raw.as_bytes().chunks(48) {
                decoder.feed_into(std::str::from_utf8(chunk).unwrap(), &mut out);
            }
            black_box(out.len())
        });
    });
}

criterion_group!(benches, bench_segmenter, bench_normalizer, bench_frame_decoder);
criterion_main!(benches);
