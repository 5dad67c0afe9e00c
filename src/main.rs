mod answer;
mod config;
mod conversation;
mod fragments;
mod i18n;
mod markup;
mod viewport;

use iced::{
    widget::{button, column, container, pick_list, rich_text, row, scrollable, span, text, text::Shaping, text_input, text_input::Id, Column},
    Element, Length, Task, Theme, Font, Subscription,
    time, font,
    keyboard::{self, Key},
    event::{self, Event as IcedEvent},
    alignment, Padding, Size,
    window,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::answer::{AnswerClient, AnswerError};
use crate::conversation::{ConversationState, Message as Entry, MessageId, OutboundRequest, Sender, WelcomeTicket};
use crate::fragments::{Block, BlockKind, Style};
use crate::i18n::{Direction, Locale, Suggestion, TextKey, SUGGESTIONS};
use crate::viewport::{ViewportAdapter, WindowKeyboard};

fn init_tracing() {
    let level = if std::env::var("CHIK_DEBUG").is_ok() { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,chik={level}")));
    let _ = fmt().with_env_filter(filter).try_init();
}

fn main() -> iced::Result {
    init_tracing();
    let config = config::Config::load();

    iced::application(App::title, App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window::Settings {
            size: Size::new(config.window.width as f32, config.window.height as f32),
            min_size: Some(Size::new(
                config.window.min_width as f32,
                config.window.min_height as f32,
            )),
            position: window::Position::Centered,
            ..Default::default()
        })
        .run_with(move || App::new(config))
}

#[derive(Debug, Clone)]
enum Message {
    InputChanged(String),
    Submit,
    Suggest(Suggestion),
    BeginConsultation,
    LocaleSelected(Locale),
    AnswerReceived(MessageId, Result<String, AnswerError>),
    ShowWelcome(WelcomeTicket),
    Tick,
    WindowFocused(bool),
    WindowResized(Size),
    Exit,
}

struct App {
    config: config::Config,
    conversation: ConversationState,
    keyboard: WindowKeyboard,
    client: Result<AnswerClient, AnswerError>,
    loading_frame: usize,
    input_id: Id,
    transcript_id: scrollable::Id,
}

impl App {
    fn new(config: config::Config) -> (Self, Task<Message>) {
        let dictionary = i18n::Dictionary::load_or_builtin(&config::Config::get_locales_path());
        let (conversation, ticket) =
            ConversationState::new(Arc::new(dictionary), config.ui.initial_locale());

        let client = AnswerClient::new(config.service.endpoint.clone(), config.service.timeout());
        match &client {
            Ok(client) => info!(endpoint = client.endpoint(), "answer service configured"),
            Err(e) => error!("Could not create answer client: {}", e),
        }

        let keyboard = WindowKeyboard::new(
            ViewportAdapter::new(config.ui.keyboard_threshold, config.ui.layout_strategy),
            config.ui.adapt_to_keyboard,
        );
        let input_id = Id::unique();

        let app = App {
            config,
            conversation,
            keyboard,
            client,
            loading_frame: 0,
            input_id: input_id.clone(),
            transcript_id: scrollable::Id::unique(),
        };

        let welcome_task = app.schedule_welcome(ticket);
        let focus_task = text_input::focus(input_id);
        let measure_task = window::get_latest()
            .and_then(window::get_size)
            .map(Message::WindowResized);

        (app, Task::batch([focus_task, measure_task, welcome_task]))
    }

    fn title(&self) -> String {
        self.conversation.text(TextKey::Title).to_string()
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::InputChanged(value) => {
                self.conversation.set_input(value);
                Task::none()
            }
            Message::Submit => match self.conversation.submit_input() {
                Some(request) => self.dispatch(request),
                None => Task::none(),
            },
            Message::Suggest(suggestion) => match self.conversation.choose_suggestion(suggestion) {
                Some(request) => {
                    Task::batch([text_input::focus(self.input_id.clone()), self.dispatch(request)])
                }
                None => Task::none(),
            },
            Message::BeginConsultation => {
                self.keyboard.focus_changed(true);
                Task::batch([text_input::focus(self.input_id.clone()), self.scroll_to_end()])
            }
            Message::LocaleSelected(locale) => match self.conversation.switch_locale(locale) {
                Some(ticket) => {
                    self.conversation.take_events();
                    self.schedule_welcome(ticket)
                }
                None => Task::none(),
            },
            Message::AnswerReceived(placeholder, outcome) => {
                let resolution = self.conversation.resolve(placeholder, outcome);
                debug!(?placeholder, ?resolution, "answer resolved");
                self.sync_transcript()
            }
            Message::ShowWelcome(ticket) => {
                if self.conversation.show_welcome(ticket) {
                    self.sync_transcript()
                } else {
                    Task::none()
                }
            }
            Message::Tick => {
                if self.conversation.loading_locked() {
                    self.loading_frame = (self.loading_frame + 1) % 30;
                }
                Task::none()
            }
            Message::WindowFocused(focused) => {
                self.keyboard.focus_changed(focused);
                Task::none()
            }
            Message::WindowResized(size) => match self.keyboard.resized(size.height) {
                Some(reposition) => {
                    if reposition.changed {
                        debug!(css = %self.keyboard.declaration(), "input bar repositioned");
                    }
                    self.scroll_to_end()
                }
                None => Task::none(),
            },
            Message::Exit => {
                iced::exit()
            }
        }
    }

    /// Issue the single answer-service call for an accepted send.
    fn dispatch(&mut self, request: OutboundRequest) -> Task<Message> {
        let OutboundRequest { placeholder, message } = request;
        let scroll = self.sync_transcript();

        let ask = match &self.client {
            Ok(client) => {
                let client = client.clone();
                let reveal = self.config.ui.reveal_delay();
                Task::perform(
                    async move { client.ask_revealed(&message, reveal).await },
                    move |outcome| Message::AnswerReceived(placeholder, outcome),
                )
            }
            Err(e) => Task::done(Message::AnswerReceived(placeholder, Err(e.clone()))),
        };

        Task::batch([scroll, ask])
    }

    fn schedule_welcome(&self, ticket: WelcomeTicket) -> Task<Message> {
        Task::perform(
            tokio::time::sleep(self.config.ui.welcome_delay()),
            move |_| Message::ShowWelcome(ticket),
        )
    }

    /// Drain transcript mutations; anything new re-anchors the scroll.
    fn sync_transcript(&mut self) -> Task<Message> {
        if self.conversation.take_events().is_empty() {
            Task::none()
        } else {
            self.scroll_to_end()
        }
    }

    fn scroll_to_end(&self) -> Task<Message> {
        scrollable::snap_to(self.transcript_id.clone(), scrollable::RelativeOffset::END)
    }

    fn subscription(&self) -> Subscription<Message> {
        let timer = if self.conversation.loading_locked() {
            time::every(Duration::from_millis(120)).map(|_| Message::Tick)
        } else {
            Subscription::none()
        };

        let events = event::listen_with(|event, _status, _id| match event {
            IcedEvent::Keyboard(keyboard::Event::KeyPressed {
                key: Key::Named(keyboard::key::Named::Escape),
                ..
            }) => Some(Message::Exit),
            IcedEvent::Window(window::Event::Focused) => Some(Message::WindowFocused(true)),
            IcedEvent::Window(window::Event::Unfocused) => Some(Message::WindowFocused(false)),
            IcedEvent::Window(window::Event::Resized(size)) => Some(Message::WindowResized(size)),
            _ => None,
        });

        Subscription::batch([timer, events])
    }

    fn view(&self) -> Element<'_, Message> {
        let locked = self.conversation.loading_locked();
        let direction = self.conversation.locale().direction();

        let header = row![
            text(self.conversation.text(TextKey::Headline1)).size(22).shaping(Shaping::Advanced),
            text(self.conversation.text(TextKey::Headline2)).size(22).shaping(Shaping::Advanced),
            container(
                pick_list(Locale::ALL, Some(self.conversation.locale()), Message::LocaleSelected)
                    .text_shaping(Shaping::Advanced)
            )
            .width(Length::Fill)
            .align_x(alignment::Horizontal::Right),
        ]
        .spacing(6)
        .align_y(alignment::Vertical::Center);

        let subheadline = text(self.conversation.text(TextKey::Subheadline))
            .size(13)
            .shaping(Shaping::Advanced);

        let chips = SUGGESTIONS.iter().fold(
            row![button(localized(self.conversation.text(TextKey::CtaButton)))
                .on_press(Message::BeginConsultation)
                .padding(8)]
            .spacing(8),
            |chips, suggestion| {
                chips.push(
                    button(localized(self.conversation.text(suggestion.label)))
                        .on_press_maybe((!locked).then_some(Message::Suggest(*suggestion)))
                        .padding(8)
                        .style(button::secondary),
                )
            },
        );

        let transcript: Element<Message> = if self.conversation.transcript().is_empty() {
            container(
                text(self.conversation.text(TextKey::Description))
                    .size(14)
                    .shaping(Shaping::Advanced),
            )
            .padding(10)
            .center_x(Length::Fill)
            .into()
        } else {
            Column::with_children(
                self.conversation
                    .transcript()
                    .iter()
                    .map(|entry| self.entry_view(entry, direction)),
            )
            .spacing(10)
            .padding(10)
            .into()
        };

        let transcript = scrollable(transcript)
            .id(self.transcript_id.clone())
            .height(Length::Fill);

        let mut input = text_input(self.conversation.text(TextKey::PlaceholderInput), self.conversation.input())
            .padding(12)
            .size(16)
            .id(self.input_id.clone());
        if !locked {
            input = input
                .on_input(Message::InputChanged)
                .on_submit(Message::Submit);
        }
        let send = button(text("➤").size(16).shaping(Shaping::Advanced))
            .on_press_maybe((!locked).then_some(Message::Submit))
            .padding(12);

        let input_bar = container(row![input, send].spacing(8).align_y(alignment::Vertical::Center))
            .padding(Padding {
                top: 0.0,
                right: 10.0,
                bottom: 10.0 + self.keyboard.offset(),
                left: 10.0,
            });

        container(column![header, subheadline, chips, transcript, input_bar].spacing(10).padding(10))
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn entry_view<'a>(&'a self, entry: &'a Entry, direction: Direction) -> Element<'a, Message> {
        let content: Element<Message> = if entry.is_pending() {
            let dots = ["●", "● ●", "● ● ●"];
            text(dots[(self.loading_frame / 10) % dots.len()])
                .size(15)
                .shaping(Shaping::Advanced)
                .into()
        } else {
            Column::with_children(fragments::parse(entry.rendered_markup()).iter().map(block_view))
                .spacing(4)
                .into()
        };

        let user = entry.sender() == Sender::User;
        let bubble = container(content)
            .padding(12)
            .max_width(560)
            .style(if user { container::bordered_box } else { container::rounded_box });

        // User turns sit on the trailing side, which flips for RTL locales.
        let trailing = user == (direction == Direction::Ltr);
        container(bubble)
            .width(Length::Fill)
            .align_x(if trailing {
                alignment::Horizontal::Right
            } else {
                alignment::Horizontal::Left
            })
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::TokyoNight
    }
}

fn localized(label: &str) -> text::Text<'_> {
    text(label).size(13).shaping(Shaping::Advanced)
}

fn inline_font(style: Style, kind: BlockKind) -> Font {
    let base = if style.code { Font::MONOSPACE } else { Font::DEFAULT };
    let bold = style.strong || kind == BlockKind::Heading;
    Font {
        weight: if bold { font::Weight::Bold } else { base.weight },
        style: if style.emphasis { font::Style::Italic } else { base.style },
        ..base
    }
}

fn block_view(block: &Block) -> Element<'static, Message> {
    let size = match block.kind {
        BlockKind::Heading => 19,
        BlockKind::Line | BlockKind::ListItem => 15,
    };

    let mut spans: Vec<text::Span<'static, Message>> = Vec::with_capacity(block.inlines.len() + 1);
    if block.kind == BlockKind::ListItem {
        spans.push(span("•  "));
    }
    for inline in &block.inlines {
        spans.push(span(inline.text.clone()).font(inline_font(inline.style, block.kind)));
    }

    rich_text(spans).size(size).into()
}
