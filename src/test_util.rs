use anyhow::anyhow;
use std::sync::{Arc, Mutex};

use crate::backends::{Backend, BackendFuture, TranslationRequest};

/// Records every request and answers by upper-casing the text.
#[derive(Clone, Default)]
pub(crate) struct UppercaseBackend {
    pub(crate) requests: Arc<Mutex<Vec<TranslationRequest>>>,
}

impl UppercaseBackend {
    pub(crate) fn submitted(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .map(|request| request.text.clone())
            .collect()
    }
}

impl Backend for UppercaseBackend {
    fn name(&self) -> &'static str {
        "uppercase"
    }

    fn translate(&self, request: TranslationRequest) -> BackendFuture {
        let text = request.text.to_uppercase();
        self.requests.lock().expect("requests lock").push(request);
        Box::pin(async move { Ok(text) })
    }
}

/// Fails every call, counting them.
#[derive(Clone, Default)]
pub(crate) struct FailingBackend {
    pub(crate) calls: Arc<Mutex<usize>>,
}

impl FailingBackend {
    pub(crate) fn calls(&self) -> usize {
        *self.calls.lock().expect("calls lock")
    }
}

impl Backend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn translate(&self, _request: TranslationRequest) -> BackendFuture {
        *self.calls.lock().expect("calls lock") += 1;
        Box::pin(async move { Err(anyhow!("service unavailable")) })
    }
}

/// Replays a fixed list of answers; `None` entries become errors.
#[derive(Clone)]
pub(crate) struct ScriptedBackend {
    answers: Arc<Mutex<Vec<Option<String>>>>,
    pub(crate) calls: Arc<Mutex<usize>>,
}

impl ScriptedBackend {
    pub(crate) fn new(answers: Vec<Option<&str>>) -> Self {
        let mut answers = answers
            .into_iter()
            .map(|answer| answer.map(str::to_string))
            .collect::<Vec<_>>();
        answers.reverse();
        Self {
            answers: Arc::new(Mutex::new(answers)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        *self.calls.lock().expect("calls lock")
    }
}

impl Backend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn translate(&self, _request: TranslationRequest) -> BackendFuture {
        *self.calls.lock().expect("calls lock") += 1;
        let answer = self.answers.lock().expect("answers lock").pop().flatten();
        Box::pin(async move { answer.ok_or_else(|| anyhow!("scripted failure")) })
    }
}

/// Answers with the input text after squeezing every whitespace run into a
/// single space, as web translators do.
#[derive(Clone, Default)]
pub(crate) struct CollapsingBackend;

impl Backend for CollapsingBackend {
    fn name(&self) -> &'static str {
        "collapsing"
    }

    fn translate(&self, request: TranslationRequest) -> BackendFuture {
        let text = request.text.split_whitespace().collect::<Vec<_>>().join(" ");
        Box::pin(async move { Ok(text) })
    }
}
