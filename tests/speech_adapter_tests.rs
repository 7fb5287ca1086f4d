// Integration tests for the speech capture adapter
//
// The adapter is driven by hand: recognizer events are injected through the
// fake factory and pulled off the adapter's channels, and timers are pumped
// until the expected state is reached.

mod common;

use common::{fast_speech_config, FakeRecognizers};
use loqa_coach::session::SessionState;
use loqa_coach::speech::{
    AdapterChannels, AdapterEvent, RecognitionAlternative, RecognitionError, RecognitionErrorKind,
    RecognizerEvent, SpeechCaptureAdapter, SpeechConfig, UnsupportedRecognizerFactory,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

struct Rig {
    adapter: SpeechCaptureAdapter,
    channels: AdapterChannels,
    gate: watch::Sender<SessionState>,
    recognizers: FakeRecognizers,
}

async fn listening_rig(config: SpeechConfig) -> Rig {
    let recognizers = FakeRecognizers::new();
    let (gate, gate_rx) = watch::channel(SessionState::Listening);
    let (mut adapter, channels) =
        SpeechCaptureAdapter::new("s1", config, Arc::new(recognizers.clone()), gate_rx);

    adapter.initialize().await.unwrap();
    let out = adapter.start().await;
    assert_eq!(out, vec![AdapterEvent::ActiveChanged(true)]);

    Rig {
        adapter,
        channels,
        gate,
        recognizers,
    }
}

impl Rig {
    /// Inject an event from the current recognizer and handle it
    async fn inject(&mut self, event: RecognizerEvent) -> Vec<AdapterEvent> {
        self.recognizers.emit(event);
        let tagged = self.channels.events.recv().await.unwrap();
        self.adapter.handle_event(tagged).await
    }

    /// Handle timers until the condition holds
    async fn pump_until(
        &mut self,
        mut done: impl FnMut(&SpeechCaptureAdapter, &[AdapterEvent]) -> bool,
    ) -> Vec<AdapterEvent> {
        let mut seen = Vec::new();
        while !done(&self.adapter, &seen) {
            let timer = tokio::time::timeout(Duration::from_secs(2), self.channels.timers.recv())
                .await
                .expect("timer did not fire")
                .unwrap();
            seen.extend(self.adapter.handle_timer(timer).await);
        }
        seen
    }
}

fn network() -> RecognizerEvent {
    RecognizerEvent::Error(RecognitionErrorKind::Network)
}

#[tokio::test]
async fn test_repeated_network_errors_reinitialize_recognizer() {
    let mut rig = listening_rig(fast_speech_config()).await;

    for expected_errors in 1..=3 {
        let out = rig.inject(network()).await;
        assert!(out.contains(&AdapterEvent::Error(RecognitionErrorKind::Network)));
        assert_eq!(rig.adapter.error_count(), expected_errors);
        rig.pump_until(|adapter, _| adapter.is_active()).await;
    }
    assert_eq!(rig.recognizers.creates(), 1);
    assert_eq!(rig.adapter.error_count(), 3);

    rig.inject(network()).await;
    assert_eq!(rig.adapter.error_count(), 4);
    rig.pump_until(|adapter, _| adapter.is_active()).await;

    assert_eq!(rig.recognizers.creates(), 2);
    assert_eq!(rig.adapter.error_count(), 0);
}

#[tokio::test]
async fn test_recoverable_error_raises_and_clears_recovering() {
    let mut rig = listening_rig(fast_speech_config()).await;

    let out = rig.inject(network()).await;
    assert!(out.contains(&AdapterEvent::Recovering(true)));
    assert!(rig.adapter.is_recovering());

    rig.pump_until(|adapter, _| !adapter.is_recovering()).await;
    assert!(!rig.adapter.is_recovering());
}

#[tokio::test]
async fn test_unknown_error_restarts_without_recovering_flag() {
    let mut rig = listening_rig(fast_speech_config()).await;

    let out = rig
        .inject(RecognizerEvent::Error(RecognitionErrorKind::parse("bad-grammar")))
        .await;

    assert_eq!(rig.adapter.error_count(), 1);
    assert!(!out.contains(&AdapterEvent::Recovering(true)));
    rig.pump_until(|adapter, _| adapter.is_active()).await;
}

#[tokio::test]
async fn test_no_speech_error_is_ignored() {
    let mut rig = listening_rig(fast_speech_config()).await;

    let out = rig
        .inject(RecognizerEvent::Error(RecognitionErrorKind::NoSpeech))
        .await;

    assert!(out.is_empty());
    assert_eq!(rig.adapter.error_count(), 0);
    assert!(rig.adapter.is_active());
}

#[tokio::test]
async fn test_results_produce_segments_and_reset_errors() {
    let mut rig = listening_rig(fast_speech_config()).await;
    rig.inject(network()).await;
    rig.pump_until(|adapter, _| adapter.is_active()).await;
    assert_eq!(rig.adapter.error_count(), 1);

    let out = rig
        .inject(RecognizerEvent::Result {
            interim: Some(RecognitionAlternative::new("and then", 0.5)),
            finals: vec![RecognitionAlternative::new("explain recursion", 0.8)],
        })
        .await;

    assert_eq!(rig.adapter.error_count(), 0);
    let AdapterEvent::Final(segment) = &out[0] else {
        panic!("expected a final segment, got {:?}", out);
    };
    assert_eq!(segment.text, "explain recursion");
    assert_eq!(segment.words.len(), 2);
    assert!(segment.words.iter().all(|w| w.confidence == 0.8));
    assert!(matches!(&out[1], AdapterEvent::Partial(s) if s.text == "and then"));

    let transcript = rig.adapter.transcript();
    assert_eq!(transcript.finals.len(), 1);
    assert_eq!(transcript.partial.as_ref().unwrap().text, "and then");
}

#[tokio::test]
async fn test_finals_in_one_result_form_one_segment() {
    let mut rig = listening_rig(fast_speech_config()).await;

    let out = rig
        .inject(RecognizerEvent::Result {
            interim: None,
            finals: vec![
                RecognitionAlternative::new("explain recursion", 0.6),
                RecognitionAlternative::new("  ", 0.1),
                RecognitionAlternative::new("with an example please", 0.9),
            ],
        })
        .await;

    let finals: Vec<_> = out
        .iter()
        .filter_map(|e| match e {
            AdapterEvent::Final(segment) => Some(segment),
            _ => None,
        })
        .collect();
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].text, "explain recursion with an example please");
    assert_eq!(finals[0].confidence, 0.9);
    assert_eq!(rig.adapter.transcript().finals.len(), 1);
}

#[tokio::test]
async fn test_events_from_replaced_recognizer_are_ignored() {
    let mut rig = listening_rig(fast_speech_config()).await;
    let stale = rig.recognizers.events();

    rig.adapter.reset().await;
    assert_eq!(rig.recognizers.creates(), 2);
    assert!(rig.adapter.is_active());

    stale.emit(RecognizerEvent::Result {
        interim: None,
        finals: vec![RecognitionAlternative::new("old words", 0.9)],
    });
    let tagged = rig.channels.events.recv().await.unwrap();
    let out = rig.adapter.handle_event(tagged).await;

    assert!(out.is_empty());
    assert!(rig.adapter.transcript().finals.is_empty());
}

#[tokio::test]
async fn test_unexpected_end_restarts_while_listening() {
    let mut rig = listening_rig(fast_speech_config()).await;

    let out = rig.inject(RecognizerEvent::Ended).await;
    assert_eq!(out, vec![AdapterEvent::ActiveChanged(false)]);

    rig.pump_until(|adapter, _| adapter.is_active()).await;
    assert_eq!(rig.recognizers.starts(), 2);
}

#[tokio::test]
async fn test_restart_skipped_once_capture_no_longer_wanted() {
    let mut rig = listening_rig(fast_speech_config()).await;

    rig.inject(RecognizerEvent::Ended).await;
    rig.gate.send_replace(SessionState::AwaitingModel);

    let timer = rig.channels.timers.recv().await.unwrap();
    let out = rig.adapter.handle_timer(timer).await;

    assert!(out.is_empty());
    assert!(!rig.adapter.is_active());
    assert_eq!(rig.recognizers.starts(), 1);
}

#[tokio::test]
async fn test_silence_flag_is_advisory() {
    let mut rig = listening_rig(fast_speech_config()).await;
    let later = tokio::time::Instant::now() + Duration::from_secs(9);

    let out = rig.adapter.check_silence(later);
    assert_eq!(out, vec![AdapterEvent::ListeningNoSpeech(true)]);
    assert!(rig.adapter.is_listening_no_speech());
    assert!(rig.adapter.is_active());

    let out = rig
        .inject(RecognizerEvent::Result {
            interim: Some(RecognitionAlternative::new("hello", 0.9)),
            finals: Vec::new(),
        })
        .await;
    assert!(out.contains(&AdapterEvent::ListeningNoSpeech(false)));
}

#[tokio::test]
async fn test_no_silence_flag_while_paused() {
    let mut rig = listening_rig(fast_speech_config()).await;
    rig.gate.send_replace(SessionState::Paused);

    let out = rig
        .adapter
        .check_silence(tokio::time::Instant::now() + Duration::from_secs(30));

    assert!(out.is_empty());
    assert!(!rig.adapter.is_listening_no_speech());
}

#[tokio::test]
async fn test_repeated_recreation_failure_is_fatal() {
    let mut rig = listening_rig(fast_speech_config()).await;
    for _ in 0..3 {
        rig.inject(network()).await;
        rig.pump_until(|adapter, _| adapter.is_active()).await;
    }

    rig.recognizers.fail_next_creates(10);
    rig.inject(network()).await;
    let out = rig
        .pump_until(|_, seen| seen.iter().any(|e| matches!(e, AdapterEvent::Fatal(_))))
        .await;

    assert!(out.iter().any(|e| matches!(e, AdapterEvent::Fatal(_))));
    assert!(!rig.adapter.is_active());
    assert_eq!(rig.recognizers.creates(), 1);
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let mut rig = listening_rig(fast_speech_config()).await;

    let (out, recording) = rig.adapter.release().await;
    assert!(out.contains(&AdapterEvent::ActiveChanged(false)));
    assert!(recording.is_none());

    let (out, _) = rig.adapter.release().await;
    assert!(out.is_empty());
    assert!(rig.adapter.start().await.is_empty());
}

#[tokio::test]
async fn test_unsupported_recognition() {
    let (_gate, gate_rx) = watch::channel(SessionState::Connecting);
    let (mut adapter, _channels) = SpeechCaptureAdapter::new(
        "s1",
        SpeechConfig::default(),
        Arc::new(UnsupportedRecognizerFactory),
        gate_rx,
    );

    let err = adapter.initialize().await.unwrap_err();
    assert_eq!(err, RecognitionError::Unsupported);
    assert_eq!(
        err.to_string(),
        "Speech recognition is not supported in this environment."
    );
}
