//! The grounder resolves natural-language element descriptions to screen
//! coordinates and compiles typed actions into input primitive sequences.
//! It also owns the task-scoped knowledge buffer and the last code-agent
//! report; the orchestrator mutates both only between phases.

pub mod platform;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::action::{AgentAction, MouseButton};
use crate::coder::{CodeAgent, CodeAgentReport};
use crate::config::{AgentTuning, Platform};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::input::Primitive;
use crate::llm::provider::{generate_with_retry, LlmProvider};
use crate::llm::providers::local::LocalGroundingClient;
use crate::llm::types::{Message, Role};
use crate::screen::ocr::{render_ocr_table, TextLocator};
use crate::screen::Observation;
use platform::{strategy_for, PlatformStrategy};

const DRAG_DURATION: f32 = 0.5;

/// Where grounding-space coordinates come from: a vision provider whose
/// text we mine for the first two integers, or the local grounding server
/// which parses them for us.
pub enum GroundingBackend {
    Model(Arc<dyn LlmProvider>),
    Local(LocalGroundingClient),
}

/// Word-box anchor used by text-anchored resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlignment {
    Start,
    End,
    Center,
}

/// External spreadsheet automation collaborator behind `SetCellValues`.
#[async_trait]
pub trait SpreadsheetDriver: Send + Sync {
    async fn set_cell_values(
        &self,
        values: &BTreeMap<String, serde_json::Value>,
        app: &str,
        sheet: &str,
    ) -> DeskPilotResult<()>;
}

pub struct Grounder {
    backend: GroundingBackend,
    /// Model that maps a phrase + OCR table to a word id.
    locator_model: Arc<dyn LlmProvider>,
    locator: Arc<dyn TextLocator>,
    platform: Box<dyn PlatformStrategy>,
    coder: CodeAgent,
    spreadsheet: Option<Box<dyn SpreadsheetDriver>>,
    max_wait_seconds: f32,
    scroll_unit: i32,
    ocr_keep_chars: String,
    observation: Option<Observation>,
    notes: Vec<String>,
    last_code_report: Option<CodeAgentReport>,
}

impl Grounder {
    pub fn new(
        backend: GroundingBackend,
        locator_model: Arc<dyn LlmProvider>,
        locator: Arc<dyn TextLocator>,
        coder: CodeAgent,
        platform: Platform,
        tuning: &AgentTuning,
    ) -> Self {
        Self {
            backend,
            locator_model,
            locator,
            platform: strategy_for(platform),
            coder,
            spreadsheet: None,
            max_wait_seconds: tuning.max_wait_seconds,
            scroll_unit: tuning.scroll_unit,
            ocr_keep_chars: tuning.ocr_keep_chars.clone(),
            observation: None,
            notes: Vec::new(),
            last_code_report: None,
        }
    }

    pub fn with_spreadsheet(mut self, driver: Box<dyn SpreadsheetDriver>) -> Self {
        self.spreadsheet = Some(driver);
        self
    }

    /// Binds this step's observation. Resolution without one is a
    /// grounding error.
    pub fn bind_observation(&mut self, observation: Observation) {
        self.observation = Some(observation);
    }

    pub fn knowledge(&self) -> &[String] {
        &self.notes
    }

    pub fn last_code_report(&self) -> Option<&CodeAgentReport> {
        self.last_code_report.as_ref()
    }

    fn obs(&self) -> DeskPilotResult<&Observation> {
        self.observation
            .as_ref()
            .ok_or_else(|| DeskPilotError::Grounding("no screenshot bound".into()))
    }

    // ── Coordinate resolution ────────────────────────────────────────────

    /// Resolves an element description to screen coordinates via the
    /// grounding model, then rescales from the model's canvas to pixels.
    pub async fn resolve_point(&self, description: &str) -> DeskPilotResult<(i32, i32)> {
        let obs = self.obs()?;
        let prompt = format!(
            "Locate the UI element described below on the screenshot. Respond with \
             the x and y coordinates of its center as two integers on the first line.\n\
             Element: {description}"
        );

        let point = match &self.backend {
            GroundingBackend::Model(provider) => {
                let mut message = Message::text(Role::User, prompt);
                message.push_image(obs.grounding_png.clone(), "image/png");
                let response =
                    generate_with_retry(&**provider, &[message], 0.0, Some(400), false).await;
                first_two_ints(&response).ok_or_else(|| {
                    DeskPilotError::Grounding(format!(
                        "no coordinates in grounding response for '{description}'"
                    ))
                })?
            }
            GroundingBackend::Local(client) => {
                let reply = client.generate(&prompt, &obs.grounding_png).await?;
                reply.coordinates.ok_or_else(|| {
                    DeskPilotError::Grounding(format!(
                        "grounding server returned no coordinates for '{description}'"
                    ))
                })?
            }
        };

        let (x, y) = obs.rescale(point.0, point.1);
        tracing::debug!(description, gx = point.0, gy = point.1, x, y, "resolved point");
        Ok((x, y))
    }

    /// Resolves a phrase to a point on a specific OCR word box, anchored at
    /// its left edge, right edge, or center.
    pub async fn resolve_text(
        &self,
        phrase: &str,
        alignment: TextAlignment,
    ) -> DeskPilotResult<(i32, i32)> {
        let obs = self.obs()?;
        let elements = self.locator.ocr(&obs.png).await?;
        if elements.is_empty() {
            return Err(DeskPilotError::Grounding(
                "OCR produced no text elements".into(),
            ));
        }

        let table = render_ocr_table(&elements, &self.ocr_keep_chars);
        let prompt = format!(
            "The table below lists words recognised on the screenshot as `id<TAB>text`.\n\
             Find the word that {} the phrase \"{phrase}\". Respond with its id; the last \
             integer in your reply is taken as the answer.\n\n{table}",
            match alignment {
                TextAlignment::Start => "starts",
                TextAlignment::End => "ends",
                TextAlignment::Center => "best matches",
            }
        );
        let mut message = Message::text(Role::User, prompt);
        message.push_image(obs.png.clone(), "image/png");

        let response =
            generate_with_retry(&*self.locator_model, &[message], 0.0, Some(400), false).await;
        let id = last_int(&response).ok_or_else(|| {
            DeskPilotError::Grounding(format!("no word id in locator response for '{phrase}'"))
        })? as usize;

        let word = elements.get(id).ok_or_else(|| {
            DeskPilotError::Grounding(format!(
                "word id {id} out of range ({} elements)",
                elements.len()
            ))
        })?;

        let point = match alignment {
            TextAlignment::Start => word.left_mid(),
            TextAlignment::End => word.right_mid(),
            TextAlignment::Center => word.center(),
        };
        tracing::debug!(phrase, id, ?alignment, x = point.0, y = point.1, "resolved text anchor");
        Ok(point)
    }

    // ── Action compilation ───────────────────────────────────────────────

    /// Compiles a typed action into the primitive sequence the input
    /// backend will execute. Knowledge and code-agent bookkeeping happen
    /// here; terminal actions compile to nothing.
    pub async fn compile(
        &mut self,
        action: &AgentAction,
        instruction: &str,
    ) -> DeskPilotResult<Vec<Primitive>> {
        match action {
            AgentAction::Click {
                description,
                num_clicks,
                button,
                hold_keys,
            } => {
                let (x, y) = self.resolve_point(description).await?;
                Ok(wrap_hold_keys(
                    hold_keys,
                    vec![Primitive::Click {
                        x,
                        y,
                        count: *num_clicks,
                        button: *button,
                    }],
                ))
            }

            AgentAction::Type {
                description,
                text,
                overwrite,
                enter,
            } => {
                let mut primitives = Vec::new();
                if let Some(description) = description {
                    let (x, y) = self.resolve_point(description).await?;
                    primitives.push(Primitive::Click {
                        x,
                        y,
                        count: 1,
                        button: MouseButton::Left,
                    });
                }
                if *overwrite {
                    primitives.push(Primitive::Hotkey {
                        keys: self.platform.select_all_keys(),
                    });
                    primitives.push(Primitive::PressBackspace);
                }
                if text.is_ascii() {
                    primitives.push(Primitive::TypeText { text: text.clone() });
                } else {
                    // Non-ASCII goes through the clipboard; key synthesis
                    // only covers the ASCII fast path.
                    primitives.push(Primitive::ClipboardSet { text: text.clone() });
                    primitives.push(Primitive::Hotkey {
                        keys: self.platform.paste_keys(),
                    });
                }
                if *enter {
                    primitives.push(Primitive::PressEnter);
                }
                Ok(primitives)
            }

            AgentAction::Scroll {
                description,
                clicks,
                horizontal,
            } => {
                let (x, y) = self.resolve_point(description).await?;
                Ok(vec![Primitive::Scroll {
                    x,
                    y,
                    ticks: clicks * self.scroll_unit,
                    horizontal: *horizontal,
                }])
            }

            AgentAction::DragAndDrop {
                start_description,
                end_description,
                hold_keys,
            } => {
                let (x1, y1) = self.resolve_point(start_description).await?;
                let (x2, y2) = self.resolve_point(end_description).await?;
                Ok(wrap_hold_keys(
                    hold_keys,
                    vec![Primitive::Drag {
                        x1,
                        y1,
                        x2,
                        y2,
                        duration: DRAG_DURATION,
                        button: MouseButton::Left,
                    }],
                ))
            }

            AgentAction::HighlightTextSpan {
                start_phrase,
                end_phrase,
                button,
            } => {
                let (x1, y1) = self.resolve_text(start_phrase, TextAlignment::Start).await?;
                let (x2, y2) = self.resolve_text(end_phrase, TextAlignment::End).await?;
                Ok(vec![Primitive::Drag {
                    x1,
                    y1,
                    x2,
                    y2,
                    duration: DRAG_DURATION,
                    button: *button,
                }])
            }

            AgentAction::Hotkey { keys } => Ok(vec![Primitive::Hotkey { keys: keys.clone() }]),

            AgentAction::HoldAndPress {
                hold_keys,
                press_keys,
            } => {
                let mut primitives: Vec<Primitive> = hold_keys
                    .iter()
                    .map(|key| Primitive::KeyDown { key: key.clone() })
                    .collect();
                for key in press_keys {
                    primitives.push(Primitive::KeyDown { key: key.clone() });
                    primitives.push(Primitive::KeyUp { key: key.clone() });
                }
                for key in hold_keys.iter().rev() {
                    primitives.push(Primitive::KeyUp { key: key.clone() });
                }
                Ok(primitives)
            }

            AgentAction::Wait { seconds } => {
                let seconds = if *seconds > self.max_wait_seconds {
                    tracing::warn!(
                        requested = seconds,
                        cap = self.max_wait_seconds,
                        "wait clamped to configured cap"
                    );
                    self.max_wait_seconds
                } else {
                    *seconds
                };
                Ok(vec![Primitive::Sleep { seconds }])
            }

            AgentAction::Done | AgentAction::Fail => Ok(Vec::new()),

            AgentAction::CallCodeAgent { task } => {
                let task = task.as_deref().unwrap_or(instruction);
                let report = self.coder.run(task).await?;
                tracing::info!(
                    reason = %report.completion_reason,
                    steps = report.steps_executed,
                    "code agent finished"
                );
                self.last_code_report = Some(report);
                Ok(Vec::new())
            }

            AgentAction::SwitchApplications { app_code } => {
                Ok(self.platform.switch_sequence(app_code))
            }

            AgentAction::Open { app_or_filename } => {
                Ok(self.platform.open_sequence(app_or_filename))
            }

            AgentAction::SaveToKnowledge { notes } => {
                self.notes.extend(notes.iter().cloned());
                tracing::info!(total = self.notes.len(), "knowledge notes saved");
                Ok(Vec::new())
            }

            AgentAction::SetCellValues { values, app, sheet } => match &self.spreadsheet {
                Some(driver) => {
                    driver.set_cell_values(values, app, sheet).await?;
                    Ok(Vec::new())
                }
                None => Err(DeskPilotError::Grounding(
                    "no spreadsheet driver configured".into(),
                )),
            },
        }
    }
}

/// Wraps a primitive sequence in key-down / key-up pairs for held keys.
fn wrap_hold_keys(hold_keys: &[String], inner: Vec<Primitive>) -> Vec<Primitive> {
    if hold_keys.is_empty() {
        return inner;
    }
    let mut primitives: Vec<Primitive> = hold_keys
        .iter()
        .map(|key| Primitive::KeyDown { key: key.clone() })
        .collect();
    primitives.extend(inner);
    primitives.extend(
        hold_keys
            .iter()
            .rev()
            .map(|key| Primitive::KeyUp { key: key.clone() }),
    );
    primitives
}

fn first_two_ints(text: &str) -> Option<(i32, i32)> {
    let re = Regex::new(r"-?\d+").ok()?;
    let mut numbers = re.find_iter(text).filter_map(|m| m.as_str().parse::<i32>().ok());
    Some((numbers.next()?, numbers.next()?))
}

fn last_int(text: &str) -> Option<i64> {
    let re = Regex::new(r"\d+").ok()?;
    re.find_iter(text)
        .last()
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::CoderConfig;
    use crate::screen::ocr::OcrElement;
    use crate::screen::{encode_png, Frame};
    use image::DynamicImage;

    struct ScriptedProvider {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            _messages: &[Message],
            _temperature: f32,
            _max_tokens: Option<u32>,
        ) -> DeskPilotResult<String> {
            Ok(self.responses.lock().unwrap().pop().unwrap_or_default())
        }
    }

    struct FixedLocator {
        elements: Vec<OcrElement>,
    }

    #[async_trait]
    impl TextLocator for FixedLocator {
        async fn ocr(&self, _png: &[u8]) -> DeskPilotResult<Vec<OcrElement>> {
            Ok(self.elements.clone())
        }
    }

    fn observation(width: u32, height: u32) -> Observation {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));
        let frame = Frame {
            png: encode_png(&DynamicImage::ImageRgba8(img)).unwrap(),
            width,
            height,
        };
        Observation::from_frame(frame, 1000, 1000).unwrap()
    }

    fn grounder_with(
        grounding: Arc<ScriptedProvider>,
        locator_model: Arc<ScriptedProvider>,
        elements: Vec<OcrElement>,
    ) -> Grounder {
        let coder_provider = ScriptedProvider::new(&[]);
        let coder = CodeAgent::new(
            coder_provider,
            &CoderConfig {
                budget: 2,
                timeout_seconds: 5,
                temperature: 0.0,
            },
        );
        let mut grounder = Grounder::new(
            GroundingBackend::Model(grounding),
            locator_model,
            Arc::new(FixedLocator { elements }),
            coder,
            Platform::Darwin,
            &AgentTuning::default(),
        );
        grounder.bind_observation(observation(1920, 1080));
        grounder
    }

    #[tokio::test]
    async fn resolve_point_rescales_from_canvas_to_screen() {
        let grounder = grounder_with(
            ScriptedProvider::new(&["The element is at (500, 500)."]),
            ScriptedProvider::new(&[]),
            vec![],
        );
        let (x, y) = grounder.resolve_point("the button").await.unwrap();
        assert!((x - 960).abs() <= 1);
        assert!((y - 540).abs() <= 1);
    }

    #[tokio::test]
    async fn resolve_point_without_observation_fails() {
        let mut grounder = grounder_with(ScriptedProvider::new(&["1 2"]), ScriptedProvider::new(&[]), vec![]);
        grounder.observation = None;
        let err = grounder.resolve_point("x").await.unwrap_err();
        assert_eq!(err.kind(), "grounding");
    }

    #[tokio::test]
    async fn unicode_type_goes_through_clipboard() {
        let mut grounder = grounder_with(
            ScriptedProvider::new(&["500 500"]),
            ScriptedProvider::new(&[]),
            vec![],
        );
        let action = AgentAction::Type {
            description: Some("the text field".into()),
            text: "résumé".into(),
            overwrite: false,
            enter: false,
        };
        let primitives = grounder.compile(&action, "task").await.unwrap();
        assert!(matches!(primitives[0], Primitive::Click { .. }));
        assert_eq!(
            primitives[1],
            Primitive::ClipboardSet {
                text: "résumé".into()
            }
        );
        assert_eq!(
            primitives[2],
            Primitive::Hotkey {
                keys: vec!["cmd".into(), "v".into()]
            }
        );
    }

    #[tokio::test]
    async fn ascii_type_is_typed_directly() {
        let mut grounder = grounder_with(
            ScriptedProvider::new(&[]),
            ScriptedProvider::new(&[]),
            vec![],
        );
        let action = AgentAction::Type {
            description: None,
            text: "hello".into(),
            overwrite: true,
            enter: true,
        };
        let primitives = grounder.compile(&action, "task").await.unwrap();
        assert_eq!(
            primitives,
            vec![
                Primitive::Hotkey {
                    keys: vec!["cmd".into(), "a".into()]
                },
                Primitive::PressBackspace,
                Primitive::TypeText {
                    text: "hello".into()
                },
                Primitive::PressEnter,
            ]
        );
    }

    #[tokio::test]
    async fn highlight_span_drags_between_word_anchors() {
        let words = vec![
            OcrElement {
                id: 0,
                text: "The".into(),
                left: 100,
                top: 100,
                width: 40,
                height: 20,
            },
            OcrElement {
                id: 1,
                text: "dog".into(),
                left: 300,
                top: 140,
                width: 44,
                height: 20,
            },
        ];
        let mut grounder = grounder_with(
            ScriptedProvider::new(&[]),
            ScriptedProvider::new(&["the start word id is 0", "the end word id is 1"]),
            words,
        );
        let action = AgentAction::HighlightTextSpan {
            start_phrase: "The quick".into(),
            end_phrase: "lazy dog".into(),
            button: MouseButton::Left,
        };
        let primitives = grounder.compile(&action, "task").await.unwrap();
        assert_eq!(
            primitives,
            vec![Primitive::Drag {
                x1: 100,
                y1: 110,
                x2: 344,
                y2: 150,
                duration: DRAG_DURATION,
                button: MouseButton::Left,
            }]
        );
    }

    #[tokio::test]
    async fn out_of_range_word_id_is_a_grounding_error() {
        let words = vec![OcrElement {
            id: 0,
            text: "only".into(),
            left: 0,
            top: 0,
            width: 10,
            height: 10,
        }];
        let grounder = grounder_with(
            ScriptedProvider::new(&[]),
            ScriptedProvider::new(&["7"]),
            words,
        );
        let err = grounder
            .resolve_text("missing", TextAlignment::Center)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "grounding");
    }

    #[tokio::test]
    async fn wait_is_clamped_to_cap() {
        let mut grounder = grounder_with(
            ScriptedProvider::new(&[]),
            ScriptedProvider::new(&[]),
            vec![],
        );
        let primitives = grounder
            .compile(&AgentAction::Wait { seconds: 1e6 }, "task")
            .await
            .unwrap();
        assert_eq!(
            primitives,
            vec![Primitive::Sleep {
                seconds: AgentTuning::default().max_wait_seconds
            }]
        );
    }

    #[tokio::test]
    async fn hold_keys_wrap_the_click() {
        let mut grounder = grounder_with(
            ScriptedProvider::new(&["10 10"]),
            ScriptedProvider::new(&[]),
            vec![],
        );
        let action = AgentAction::Click {
            description: "a file".into(),
            num_clicks: 1,
            button: MouseButton::Left,
            hold_keys: vec!["shift".into()],
        };
        let primitives = grounder.compile(&action, "task").await.unwrap();
        assert!(matches!(primitives[0], Primitive::KeyDown { ref key } if key == "shift"));
        assert!(matches!(primitives[1], Primitive::Click { .. }));
        assert!(matches!(primitives[2], Primitive::KeyUp { ref key } if key == "shift"));
    }

    #[tokio::test]
    async fn save_to_knowledge_appends_notes() {
        let mut grounder = grounder_with(
            ScriptedProvider::new(&[]),
            ScriptedProvider::new(&[]),
            vec![],
        );
        let action = AgentAction::SaveToKnowledge {
            notes: vec!["invoice number is 42".into()],
        };
        let primitives = grounder.compile(&action, "task").await.unwrap();
        assert!(primitives.is_empty());
        assert_eq!(grounder.knowledge(), ["invoice number is 42"]);
    }

    #[test]
    fn integer_mining() {
        assert_eq!(first_two_ints("x=500, y=500"), Some((500, 500)));
        assert_eq!(first_two_ints("none here"), None);
        assert_eq!(last_int("ids 3, 7 and 12"), Some(12));
    }

    #[tokio::test]
    async fn set_cell_values_without_driver_degrades() {
        let mut grounder = grounder_with(
            ScriptedProvider::new(&[]),
            ScriptedProvider::new(&[]),
            vec![],
        );
        let action = AgentAction::SetCellValues {
            values: BTreeMap::new(),
            app: "calc".into(),
            sheet: "Sheet1".into(),
        };
        let err = grounder.compile(&action, "task").await.unwrap_err();
        assert_eq!(err.kind(), "grounding");
    }
}
