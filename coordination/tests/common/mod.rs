//! Scripted providers shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use polish_coordination::{
    Provider, ProviderError, ProviderPool, ProviderResult, ProviderStats, RouterConfig,
    SharedProvider,
};

type Responder = dyn Fn(&str) -> ProviderResult<String> + Send + Sync;

/// Provider answering each prompt with a closure; records every prompt.
pub struct ScriptedProvider {
    name: String,
    respond: Box<Responder>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new<F>(name: &str, respond: F) -> Arc<Self>
    where
        F: Fn(&str) -> ProviderResult<String> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.to_string(),
            respond: Box::new(respond),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Verification replies proposing `polished`; note prompts get `notes`.
    pub fn polisher(name: &str, polished: &str, score: f64, notes: &str) -> Arc<Self> {
        let verification = verification_reply(score, polished);
        let notes = notes.to_string();
        Self::new(name, move |prompt| {
            if is_note_prompt(prompt) {
                Ok(notes.clone())
            } else {
                Ok(verification.clone())
            }
        })
    }

    /// Always fails with `error`.
    pub fn failing(name: &str, error: ProviderError) -> Arc<Self> {
        Self::new(name, move |_| Err(error.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn translate(&self, text: &str, _hint: &str) -> ProviderResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(text.to_string());
        (self.respond)(text)
    }

    fn stats(&self) -> ProviderStats {
        ProviderStats {
            total: self.calls() as u64,
            ..Default::default()
        }
    }
}

pub fn is_note_prompt(prompt: &str) -> bool {
    prompt.contains("literary analyst")
}

pub fn verification_reply(score: f64, polished: &str) -> String {
    format!(
        "SPIRIT_SCORE: {score}\nLANGUAGE_SCORE: {score}\nCONTEXT_SCORE: {score}\n\
         VOCABULARY_SCORE: {score}\nISSUES:\nPOLISHED_TEXT:\n{polished}\nEXPLANATION:\nscripted\n"
    )
}

pub const NOTES_REPLY: &str = "NOTE: culture
IMPORTANCE: high
TITLE: Greeting register
CONTENT: The greeting is informal between old friends.
EXAMPLES: Привет
IMPLICATIONS: Keep the informal register.
---
NOTE: tone
IMPORTANCE: low
TITLE: Light mood
CONTENT: Nothing heavy here.
---
";

/// Pool with one instance per provider and no retry delay.
pub fn pool_of(providers: &[Arc<ScriptedProvider>]) -> ProviderPool {
    let mut pool = ProviderPool::new(
        RouterConfig::new(1, std::time::Duration::ZERO),
        None,
        "test-session",
    );
    for provider in providers {
        let handle: SharedProvider = provider.clone();
        pool.register(provider.name(), "scripted", vec![handle]);
    }
    pool
}
