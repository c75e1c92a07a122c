//! Property-based tests for the stream decoders.
//!
//! These tests use proptest to check that decoding does not depend on where
//! the transport happened to split the upstream body.

use glossa_gateway::api::streaming::{normalize, StreamIncrement, UpstreamFrames};
use glossa_gateway::core::StreamCancelHandle;
use glossa_gateway::transformer::{decode_all, WireFormat};
use futures::StreamExt;
use proptest::prelude::*;

fn greek_fragment() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "Καλὴ", " ἡμέρα", "ἄνδρα", " μοι ἔννεπε", ",", " Μοῦσα", "!", " ῥόδον", "\"q\"", "\\",
    ])
    .prop_map(|s| s.to_string())
}

fn fragments() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(greek_fragment(), 1..12)
}

/// Serialize fragments the way each provider puts them on the wire.
fn wire_body(format: WireFormat, fragments: &[String]) -> Vec<u8> {
    let mut body = String::new();
    for text in fragments {
        let text = serde_json::to_string(text).unwrap();
        match format {
            WireFormat::ChatCompletions => body.push_str(&format!(
                "data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":{}}}}}]}}\n\n",
                text
            )),
            WireFormat::GenerateNdjson => {
                body.push_str(&format!("{{\"response\":{},\"done\":false}}\n", text))
            }
            WireFormat::TokenEvents => body.push_str(&format!(
                "data:{{\"token\":{{\"id\":1,\"text\":{},\"special\":false}}}}\n\n",
                text
            )),
            WireFormat::Generator => unreachable!("generator frames are not byte streams"),
        }
    }
    match format {
        WireFormat::ChatCompletions | WireFormat::TokenEvents => body.push_str("data: [DONE]\n\n"),
        _ => body.push_str("{\"response\":\"\",\"done\":true}\n"),
    }
    body.into_bytes()
}

fn split_at(body: &[u8], mut cuts: Vec<usize>) -> Vec<&[u8]> {
    cuts.iter_mut().for_each(|c| *c %= body.len() + 1);
    cuts.sort_unstable();
    cuts.dedup();

    let mut frames = Vec::new();
    let mut start = 0;
    for cut in cuts {
        frames.push(&body[start..cut]);
        start = cut;
    }
    frames.push(&body[start..]);
    frames
}

fn framed_format() -> impl Strategy<Value = WireFormat> {
    prop::sample::select(vec![
        WireFormat::ChatCompletions,
        WireFormat::GenerateNdjson,
        WireFormat::TokenEvents,
    ])
}

proptest! {
    /// Property: splitting the body at arbitrary byte offsets, even inside a
    /// multi-byte character, yields the same increments and terminal.
    #[test]
    fn prop_split_boundaries_do_not_change_output(
        format in framed_format(),
        fragments in fragments(),
        cuts in prop::collection::vec(any::<usize>(), 0..5),
    ) {
        let body = wire_body(format, &fragments);
        let (whole, whole_terminal) = decode_all(format, [body.as_slice()]);
        let (split, split_terminal) = decode_all(format, split_at(&body, cuts));

        prop_assert_eq!(whole.concat(), fragments.concat());
        prop_assert_eq!(&split, &whole);
        prop_assert_eq!(split_terminal, whole_terminal);
    }

    /// Property: generator chunks pass through unchanged and in order.
    #[test]
    fn prop_generator_chunks_pass_through(fragments in fragments()) {
        let frames: Vec<&[u8]> = fragments.iter().map(|f| f.as_bytes()).collect();
        let (out, terminal) = decode_all(WireFormat::Generator, frames);
        prop_assert!(!terminal);
        prop_assert_eq!(out, fragments);
    }

    /// Property: the normalized stream ends with exactly one terminal record.
    #[test]
    fn prop_exactly_one_terminal(
        format in framed_format(),
        fragments in fragments(),
        cuts in prop::collection::vec(any::<usize>(), 0..5),
        trailing_garbage in any::<bool>(),
    ) {
        let mut body = wire_body(format, &fragments);
        if trailing_garbage {
            body.extend_from_slice(b"data: {\"late\":true}\n\n");
        }
        let frames: Vec<std::io::Result<bytes::Bytes>> = split_at(&body, cuts)
            .into_iter()
            .map(|f| Ok(bytes::Bytes::copy_from_slice(f)))
            .collect();
        let upstream: UpstreamFrames = Box::pin(futures::stream::iter(frames));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let out: Vec<StreamIncrement> = runtime.block_on(
            normalize(upstream, format.decoder(), StreamCancelHandle::new(), "prop").collect(),
        );

        let terminals = out.iter().filter(|i| i.is_terminal()).count();
        prop_assert_eq!(terminals, 1);
        prop_assert!(out.last().map(|i| i.is_terminal()).unwrap_or(false));
        prop_assert!(out.iter().all(|i| !matches!(i, StreamIncrement::Content(t) if t.is_empty())));
    }
}
