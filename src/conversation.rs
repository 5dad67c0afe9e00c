//! Conversation state: the transcript, the single-flight loading gate and the
//! locale-bound interface text.
//!
//! All mutation goes through [`ConversationState`]. Sending is split in two
//! halves so the caller can run the network call outside of `&mut self`:
//! [`ConversationState::send_message`] hands back an [`OutboundRequest`] and
//! [`ConversationState::resolve`] applies its outcome. A resolution whose
//! placeholder has since been cleared away is dropped.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::answer::AnswerError;
use crate::i18n::{Dictionary, Locale, Suggestion, TextKey, UiText};
use crate::markup::{self, WORKING_INDICATOR};

/// Opaque handle to one transcript message. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Final,
}

#[derive(Debug, Clone)]
pub struct Message {
    id: MessageId,
    sender: Sender,
    raw_text: String,
    rendered_markup: String,
    phase: Phase,
}

impl Message {
    #[cfg(test)]
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    #[cfg(test)]
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn rendered_markup(&self) -> &str {
        &self.rendered_markup
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_pending(&self) -> bool {
        self.phase == Phase::Pending
    }
}

/// One mutation of the transcript, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptEvent {
    Appended(MessageId),
    Replaced(MessageId),
    Cleared,
}

#[derive(Debug, Default, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_pending()).count()
    }

    fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    fn clear(&mut self) {
        self.messages.clear();
    }
}

/// The single call the caller must make to the answer service for an
/// accepted send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub placeholder: MessageId,
    pub message: String,
}

/// Permission to show the welcome message for one locale switch. Only the
/// ticket from the most recent switch is honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WelcomeTicket {
    epoch: u64,
}

/// How a call to [`ConversationState::resolve`] was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Answered,
    Apologized,
    Stale,
}

#[derive(Debug, Clone)]
pub struct ConversationState {
    transcript: Transcript,
    in_flight: Option<MessageId>,
    locale: Locale,
    input: String,
    text: UiText,
    dictionary: Arc<Dictionary>,
    next_id: u64,
    epoch: u64,
    events: Vec<TranscriptEvent>,
}

impl ConversationState {
    /// Create the state for `locale`. The returned ticket schedules the first
    /// welcome message, exactly as a locale switch does.
    pub fn new(dictionary: Arc<Dictionary>, locale: Locale) -> (Self, WelcomeTicket) {
        let mut state = Self {
            transcript: Transcript::default(),
            in_flight: None,
            locale,
            input: String::new(),
            text: UiText::default(),
            dictionary,
            next_id: 0,
            epoch: 0,
            events: Vec::new(),
        };
        let ticket = state.set_locale(locale);
        (state, ticket)
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn text(&self, key: TextKey) -> &str {
        self.text.get(key)
    }

    /// True while an answer is outstanding; sends are rejected meanwhile.
    pub fn loading_locked(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn set_input(&mut self, value: String) {
        self.input = value;
    }

    /// Drain the mutations recorded since the previous call.
    pub fn take_events(&mut self) -> Vec<TranscriptEvent> {
        std::mem::take(&mut self.events)
    }

    /// Send the current input value.
    pub fn submit_input(&mut self) -> Option<OutboundRequest> {
        let text = self.input.clone();
        self.send_message(&text)
    }

    /// Put a suggestion's question in the input and send it.
    pub fn choose_suggestion(&mut self, suggestion: Suggestion) -> Option<OutboundRequest> {
        let query = self.text.get(suggestion.query).to_string();
        self.input = query.clone();
        self.send_message(&query)
    }

    /// Accept `text` as the user's next turn.
    ///
    /// Returns `None` without touching anything when the trimmed text is empty
    /// or another answer is still outstanding. Otherwise closes the gate,
    /// appends the user message and an assistant placeholder, clears the
    /// input, and returns the one request the caller must issue.
    pub fn send_message(&mut self, text: &str) -> Option<OutboundRequest> {
        let message = text.trim();
        if message.is_empty() {
            debug!("ignoring empty message");
            return None;
        }
        if let Some(pending) = self.in_flight {
            debug!(?pending, "ignoring send while an answer is outstanding");
            return None;
        }

        self.append(Sender::User, message.to_string(), markup::render(message), Phase::Final);
        let placeholder = self.append(
            Sender::Assistant,
            String::new(),
            WORKING_INDICATOR.to_string(),
            Phase::Pending,
        );
        self.in_flight = Some(placeholder);
        self.input.clear();

        info!(?placeholder, len = message.len(), "message sent");
        Some(OutboundRequest {
            placeholder,
            message: message.to_string(),
        })
    }

    /// Apply the answer service outcome for `placeholder`.
    ///
    /// A placeholder that is no longer in the transcript is left alone. The
    /// gate reopens only for the request that closed it.
    pub fn resolve(
        &mut self,
        placeholder: MessageId,
        outcome: Result<String, AnswerError>,
    ) -> Resolution {
        if self.in_flight == Some(placeholder) {
            self.in_flight = None;
        }

        let apology = self.text.get(TextKey::ErrorMessage).to_string();
        let Some(message) = self
            .transcript
            .get_mut(placeholder)
            .filter(|m| m.is_pending())
        else {
            debug!(?placeholder, "discarding stale answer");
            return Resolution::Stale;
        };

        let resolution = match outcome {
            Ok(answer) => {
                message.rendered_markup = markup::render(&answer);
                message.raw_text = answer;
                Resolution::Answered
            }
            Err(e) => {
                warn!(?placeholder, "answer failed: {e}");
                message.rendered_markup = markup::render(&apology);
                message.raw_text = apology;
                Resolution::Apologized
            }
        };
        message.phase = Phase::Final;
        self.events.push(TranscriptEvent::Replaced(placeholder));
        resolution
    }

    /// Switch the interface to `locale`.
    ///
    /// Every dictionary string available for the locale replaces the current
    /// one, the transcript is cleared, and the returned ticket lets the caller
    /// add the welcome message once its display delay has elapsed. An answer
    /// still in flight is abandoned: its placeholder is gone, so its
    /// resolution only reopens the gate.
    pub fn set_locale(&mut self, locale: Locale) -> WelcomeTicket {
        let missing = self.text.apply(&self.dictionary, locale);
        if !missing.is_empty() {
            let keys: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
            warn!(locale = locale.code(), ?keys, "dictionary keys missing; keeping prior text");
        }

        self.locale = locale;
        self.transcript.clear();
        self.events.push(TranscriptEvent::Cleared);
        self.epoch += 1;

        info!(locale = locale.code(), "locale changed");
        WelcomeTicket { epoch: self.epoch }
    }

    /// Switch to `locale` unless it is already the current one. Picking the
    /// active locale again leaves the transcript untouched.
    pub fn switch_locale(&mut self, locale: Locale) -> Option<WelcomeTicket> {
        if locale == self.locale {
            debug!(locale = locale.code(), "locale unchanged");
            return None;
        }
        Some(self.set_locale(locale))
    }

    /// Append the welcome message if `ticket` belongs to the latest locale
    /// switch. Returns whether it was shown.
    pub fn show_welcome(&mut self, ticket: WelcomeTicket) -> bool {
        if ticket.epoch != self.epoch {
            debug!("skipping welcome for superseded locale switch");
            return false;
        }
        let welcome = self.text.get(TextKey::WelcomeMessage).to_string();
        let rendered = markup::render(&welcome);
        self.append(Sender::Assistant, welcome, rendered, Phase::Final);
        // A ticket is good for one welcome.
        self.epoch += 1;
        true
    }

    fn append(
        &mut self,
        sender: Sender,
        raw_text: String,
        rendered_markup: String,
        phase: Phase,
    ) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        self.transcript.push(Message {
            id,
            sender,
            raw_text,
            rendered_markup,
            phase,
        });
        self.events.push(TranscriptEvent::Appended(id));
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::SUGGESTIONS;
    use reqwest::StatusCode;

    fn state(locale: Locale) -> ConversationState {
        let (mut state, ticket) = ConversationState::new(Arc::new(Dictionary::builtin()), locale);
        assert!(state.show_welcome(ticket));
        state.take_events();
        state
    }

    fn welcome(locale: Locale) -> String {
        Dictionary::builtin()
            .lookup(locale, TextKey::WelcomeMessage)
            .unwrap()
            .to_string()
    }

    #[test]
    fn starts_with_one_welcome_message() {
        let state = state(Locale::En);
        assert_eq!(state.transcript().len(), 1);
        let message = state.transcript().last().unwrap();
        assert_eq!(message.sender(), Sender::Assistant);
        assert_eq!(message.raw_text(), welcome(Locale::En));
        assert!(!state.loading_locked());
    }

    #[test]
    fn send_appends_user_and_placeholder() {
        let mut state = state(Locale::En);
        state.set_input("  What is **SARL**?  ".to_string());

        let request = state.submit_input().unwrap();

        assert_eq!(request.message, "What is **SARL**?");
        assert!(state.loading_locked());
        assert_eq!(state.input(), "");
        assert_eq!(state.transcript().len(), 3);

        let user = state.transcript().iter().nth(1).unwrap();
        assert_eq!(user.sender(), Sender::User);
        assert_eq!(user.phase(), Phase::Final);
        assert_eq!(user.rendered_markup(), "What is <strong>SARL</strong>?");

        let placeholder = state.transcript().get(request.placeholder).unwrap();
        assert_eq!(placeholder.sender(), Sender::Assistant);
        assert!(placeholder.is_pending());
        assert_eq!(placeholder.rendered_markup(), WORKING_INDICATOR);
        assert_eq!(state.transcript().pending_count(), 1);

        let events = state.take_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], TranscriptEvent::Appended(request.placeholder));
    }

    #[test]
    fn successful_answer_finalizes_placeholder() {
        let mut state = state(Locale::En);
        let request = state.send_message("hello").unwrap();
        state.take_events();

        let resolution = state.resolve(request.placeholder, Ok("-- a\n-- b".to_string()));

        assert_eq!(resolution, Resolution::Answered);
        assert!(!state.loading_locked());
        let answer = state.transcript().get(request.placeholder).unwrap();
        assert_eq!(answer.phase(), Phase::Final);
        assert_eq!(answer.raw_text(), "-- a\n-- b");
        assert_eq!(answer.rendered_markup(), "<ul><li>a</li><li>b</li></ul>");
        assert_eq!(state.transcript().pending_count(), 0);
        assert_eq!(
            state.take_events(),
            vec![TranscriptEvent::Replaced(request.placeholder)]
        );
    }

    #[test]
    fn every_failure_becomes_the_localized_apology() {
        let failures = [
            AnswerError::Status(StatusCode::INTERNAL_SERVER_ERROR),
            AnswerError::Service("model offline".to_string()),
            AnswerError::Malformed("missing `response` field".to_string()),
        ];
        for failure in failures {
            let mut state = state(Locale::Fr);
            let request = state.send_message("bonjour").unwrap();

            let resolution = state.resolve(request.placeholder, Err(failure));

            assert_eq!(resolution, Resolution::Apologized);
            assert!(!state.loading_locked());
            let answer = state.transcript().get(request.placeholder).unwrap();
            assert_eq!(answer.phase(), Phase::Final);
            assert_eq!(
                answer.raw_text(),
                Dictionary::builtin()
                    .lookup(Locale::Fr, TextKey::ErrorMessage)
                    .unwrap()
            );
        }
    }

    #[test]
    fn blank_input_is_ignored() {
        let mut state = state(Locale::En);
        for text in ["", "   ", "\n\t "] {
            assert!(state.send_message(text).is_none());
        }
        assert_eq!(state.transcript().len(), 1);
        assert!(!state.loading_locked());
        assert!(state.take_events().is_empty());
    }

    #[test]
    fn send_while_locked_is_ignored() {
        let mut state = state(Locale::En);
        state.send_message("first").unwrap();
        state.set_input("second".to_string());

        assert!(state.submit_input().is_none());
        assert_eq!(state.transcript().len(), 3);
        assert_eq!(state.input(), "second");
        assert_eq!(state.transcript().pending_count(), 1);
    }

    #[test]
    fn user_can_resend_after_failure() {
        let mut state = state(Locale::En);
        let first = state.send_message("q").unwrap();
        state.resolve(first.placeholder, Err(AnswerError::Service("x".to_string())));

        let second = state.send_message("q").unwrap();

        assert_ne!(first.placeholder, second.placeholder);
        assert_eq!(state.transcript().len(), 5);
    }

    #[test]
    fn locale_switch_resets_to_one_welcome() {
        let mut state = state(Locale::En);
        let request = state.send_message("hello").unwrap();
        state.resolve(request.placeholder, Ok("hi".to_string()));
        state.take_events();

        let ticket = state.set_locale(Locale::Ar);
        assert!(state.transcript().is_empty());
        assert!(state.show_welcome(ticket));

        assert_eq!(state.locale(), Locale::Ar);
        assert_eq!(state.transcript().len(), 1);
        assert_eq!(state.transcript().last().unwrap().raw_text(), welcome(Locale::Ar));
        let dictionary = Dictionary::builtin();
        for key in TextKey::ALL {
            assert_eq!(state.text(key), dictionary.lookup(Locale::Ar, key).unwrap());
        }
        let events = state.take_events();
        assert_eq!(events[0], TranscriptEvent::Cleared);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn superseded_welcome_is_not_shown() {
        let mut state = state(Locale::En);
        let stale = state.set_locale(Locale::Fr);
        let fresh = state.set_locale(Locale::Ar);

        assert!(!state.show_welcome(stale));
        assert!(state.show_welcome(fresh));
        assert!(!state.show_welcome(fresh));
        assert_eq!(state.transcript().len(), 1);
    }

    #[test]
    fn stale_answer_does_not_touch_transcript() {
        let mut state = state(Locale::En);
        let request = state.send_message("hello").unwrap();
        let ticket = state.set_locale(Locale::Fr);
        state.show_welcome(ticket);
        let before: Vec<(MessageId, String)> = state
            .transcript()
            .iter()
            .map(|m| (m.id(), m.rendered_markup().to_string()))
            .collect();
        state.take_events();

        let resolution = state.resolve(request.placeholder, Ok("late".to_string()));

        assert_eq!(resolution, Resolution::Stale);
        let after: Vec<(MessageId, String)> = state
            .transcript()
            .iter()
            .map(|m| (m.id(), m.rendered_markup().to_string()))
            .collect();
        assert_eq!(before, after);
        assert!(state.take_events().is_empty());
        // The abandoned request still held the gate; its resolution frees it.
        assert!(!state.loading_locked());
    }

    #[test]
    fn gate_stays_closed_until_abandoned_request_resolves() {
        let mut state = state(Locale::En);
        let request = state.send_message("hello").unwrap();
        state.set_locale(Locale::Fr);

        assert!(state.send_message("encore").is_none());
        state.resolve(request.placeholder, Err(AnswerError::Service("late".to_string())));
        assert!(state.send_message("encore").is_some());
    }

    #[test]
    fn duplicate_resolution_is_ignored() {
        let mut state = state(Locale::En);
        let request = state.send_message("hello").unwrap();
        state.resolve(request.placeholder, Ok("first".to_string()));

        let second = state.resolve(request.placeholder, Ok("second".to_string()));

        assert_eq!(second, Resolution::Stale);
        assert_eq!(
            state.transcript().get(request.placeholder).unwrap().raw_text(),
            "first"
        );
    }

    #[test]
    fn suggestion_sends_its_localized_query() {
        let mut state = state(Locale::Fr);

        let request = state.choose_suggestion(SUGGESTIONS[1]).unwrap();

        assert_eq!(
            request.message,
            Dictionary::builtin()
                .lookup(Locale::Fr, TextKey::QueryFamily)
                .unwrap()
        );
        assert_eq!(state.input(), "");
    }

    #[test]
    fn ids_are_never_reused_across_clears() {
        let mut state = state(Locale::En);
        let before = state.transcript().last().unwrap().id();
        let ticket = state.set_locale(Locale::En);
        state.show_welcome(ticket);
        assert!(state.transcript().last().unwrap().id() > before);
    }

    #[test]
    fn reselecting_the_current_locale_keeps_the_transcript() {
        let mut state = state(Locale::Fr);
        let request = state.send_message("Bonjour").unwrap();
        state.take_events();

        assert_eq!(state.switch_locale(Locale::Fr), None);

        assert!(state.take_events().is_empty());
        assert_eq!(state.transcript().len(), 3);
        assert!(state.transcript().get(request.placeholder).unwrap().is_pending());

        let ticket = state.switch_locale(Locale::Ar).unwrap();
        assert!(state.transcript().is_empty());
        assert!(state.show_welcome(ticket));
        assert_eq!(
            state.text(TextKey::Title),
            Dictionary::builtin().lookup(Locale::Ar, TextKey::Title).unwrap()
        );
    }

    #[tokio::test]
    async fn revealed_answer_finalizes_the_placeholder() {
        use crate::answer::AnswerClient;
        use httpmock::prelude::*;
        use std::time::Duration;

        let server = httpmock::MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/ask");
                then.status(200)
                    .json_body(serde_json::json!({ "response": "### Done" }));
            })
            .await;
        let client = AnswerClient::new(server.url("/ask"), Duration::from_secs(5)).unwrap();

        let mut state = state(Locale::En);
        let request = state.send_message("status?").unwrap();
        let outcome = client
            .ask_revealed(&request.message, Duration::from_millis(20))
            .await;

        assert!(state.loading_locked());
        assert_eq!(state.resolve(request.placeholder, outcome), Resolution::Answered);
        assert!(!state.loading_locked());
        assert_eq!(
            state.transcript().get(request.placeholder).unwrap().rendered_markup(),
            "<h3>Done</h3>"
        );
    }
}
