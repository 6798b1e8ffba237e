//! Scripted consultation dialogue.
//!
//! Each session walks `welcome → basic_info → assessment_intro →
//! assessment_active → assessment_complete → recommendations`. Every call to
//! [`ConsultationEngine::handle_message`] returns a [`ConsultationReply`]
//! that carries both the text to show and a structured description of the
//! widgets (forms, buttons, quiz progress, course cards) that the front-end
//! renders for the next step.
//!
//! Sessions are held in memory only and are created on first use.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::LazyLock;

static NAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:my name is|i am|i'm|call me)\s+(\w+)",
        r"(?:name is|name:)\s*(\w+)",
        r"^(\w+)$",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static CHOICE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[1-3]").ok());

static AGE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b(\d{1,2})\b").ok());

const INVALID_CHOICE_PREFIX: &str = "Please select one of the options above or type 1, 2, or 3.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Welcome,
    BasicInfo,
    AssessmentIntro,
    AssessmentActive,
    AssessmentComplete,
    Recommendations,
    Error,
}

/// How the user produced the input: typed text, a button press, or a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Text,
    ButtonClick,
    FormSubmit,
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ActionType::Text),
            "button_click" => Ok(ActionType::ButtonClick),
            "form_submit" => Ok(ActionType::FormSubmit),
            other => Err(format!(
                "Unknown action_type: '{}'. Must be text, button_click or form_submit.",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsultationReply {
    pub response: String,
    pub ui_elements: UiElements,
    pub stage: Stage,
    pub allow_text_input: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_fallback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiElements {
    Form {
        fields: Vec<FormField>,
        submit_button: String,
        action: String,
    },
    MultiSection {
        sections: Vec<ButtonSection>,
    },
    ActionButtons {
        buttons: Vec<Button>,
    },
    QuestionInterface {
        progress: Progress,
        answers: Vec<Button>,
    },
    ResultsDisplay {
        score: AssessmentResult,
        next_button: Button,
    },
    CourseRecommendations {
        courses: Vec<Button>,
        action_buttons: Vec<Button>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormField {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub placeholder: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButtonSection {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub buttons: Vec<Button>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Button {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl Button {
    fn click(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            subtitle: None,
            description: None,
            action: "button_click".to_string(),
            style: None,
        }
    }

    fn styled(mut self, style: &str) -> Self {
        self.style = Some(style.to_string());
        self
    }

    fn subtitle(mut self, subtitle: &str) -> Self {
        self.subtitle = Some(subtitle.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub percentage: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentAnswer {
    pub question: usize,
    pub choice: usize,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentResult {
    pub correct: usize,
    pub total: usize,
    pub percentage: usize,
    pub level: String,
}

pub struct AssessmentQuestion {
    pub id: &'static str,
    pub question: &'static str,
    pub options: [&'static str; 3],
    /// 1-based index into `options`.
    pub correct_answer: usize,
}

pub static ASSESSMENT_QUESTIONS: [AssessmentQuestion; 5] = [
    AssessmentQuestion {
        id: "q1",
        question: "Choose the correct sentence:",
        options: [
            "He go to school every day",
            "He goes to school every day",
            "He going to school every day",
        ],
        correct_answer: 2,
    },
    AssessmentQuestion {
        id: "q2",
        question: "Select the best response to \"How are you?\":",
        options: ["I am fine, thank you", "Fine is me", "Me fine today"],
        correct_answer: 1,
    },
    AssessmentQuestion {
        id: "q3",
        question: "Choose the correct past tense:",
        options: [
            "I eat pizza yesterday",
            "I ate pizza yesterday",
            "I eated pizza yesterday",
        ],
        correct_answer: 2,
    },
    AssessmentQuestion {
        id: "q4",
        question: "Which sentence uses \"can\" correctly?",
        options: ["I can to swim", "I can swim", "I can swimming"],
        correct_answer: 2,
    },
    AssessmentQuestion {
        id: "q5",
        question: "Complete: \"She _____ her homework every night.\"",
        options: ["do", "does", "doing"],
        correct_answer: 2,
    },
];

pub struct Course {
    pub id: &'static str,
    pub name: &'static str,
    pub duration: &'static str,
    pub schedule: &'static str,
    pub description: &'static str,
}

static BEGINNER_COURSES: [Course; 2] = [
    Course {
        id: "beg001",
        name: "English Foundations",
        duration: "8 weeks",
        schedule: "Tue/Thu 4-5pm",
        description: "Perfect for building basic English skills with fun activities and games.",
    },
    Course {
        id: "beg002",
        name: "Speaking & Listening Starter",
        duration: "6 weeks",
        schedule: "Mon/Wed 4-5pm",
        description: "Focus on conversation skills and pronunciation for beginners.",
    },
];

static INTERMEDIATE_COURSES: [Course; 2] = [
    Course {
        id: "int001",
        name: "Grammar & Conversation",
        duration: "10 weeks",
        schedule: "Tue/Thu 5-6pm",
        description: "Strengthen grammar while practicing real-world conversations.",
    },
    Course {
        id: "int002",
        name: "Reading & Writing Plus",
        duration: "8 weeks",
        schedule: "Mon/Wed 5-6pm",
        description: "Improve reading comprehension and writing skills.",
    },
];

static ADVANCED_COURSES: [Course; 1] = [Course {
    id: "adv001",
    name: "Advanced Communication",
    duration: "12 weeks",
    schedule: "Tue/Thu 6-7pm",
    description: "Master complex topics and advanced grammar structures.",
}];

/// Courses for a level; unknown levels get the intermediate list.
pub fn courses_for_level(level: &str) -> &'static [Course] {
    match level {
        "beginner" => &BEGINNER_COURSES,
        "advanced" => &ADVANCED_COURSES,
        _ => &INTERMEDIATE_COURSES,
    }
}

/// Map a percentage score to a course level.
pub fn level_for_score(percentage: usize) -> &'static str {
    if percentage >= 80 {
        "advanced"
    } else if percentage >= 60 {
        "intermediate"
    } else {
        "beginner"
    }
}

#[derive(Debug, Clone)]
pub struct ConsultationSession {
    pub session_id: String,
    pub stage: Stage,
    /// Collected answers: `name`, `age_range`, `level` and any extra form fields.
    pub data: BTreeMap<String, String>,
    pub current_question: usize,
    pub assessment_answers: Vec<AssessmentAnswer>,
    pub assessment_results: Option<AssessmentResult>,
    pub assessed_level: Option<String>,
    error_message: Option<String>,
}

impl ConsultationSession {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            stage: Stage::Welcome,
            data: BTreeMap::new(),
            current_question: 0,
            assessment_answers: Vec::new(),
            assessment_results: None,
            assessed_level: None,
            error_message: None,
        }
    }

    fn name(&self) -> &str {
        self.data.get("name").map(String::as_str).unwrap_or("there")
    }

    fn effective_level(&self) -> String {
        self.assessed_level
            .clone()
            .or_else(|| self.data.get("level").cloned())
            .unwrap_or_else(|| "intermediate".to_string())
    }
}

#[derive(Default)]
pub struct ConsultationEngine {
    sessions: HashMap<String, ConsultationSession>,
}

impl ConsultationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_message(
        &mut self,
        user_input: &str,
        session_id: &str,
        action: ActionType,
    ) -> ConsultationReply {
        let session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| ConsultationSession::new(session_id));

        let before = session.stage;
        let reply = match session.stage {
            Stage::Welcome => handle_welcome(user_input, session, action),
            Stage::BasicInfo => handle_basic_info(user_input, session, action),
            Stage::AssessmentIntro => handle_assessment_intro(user_input, session, action),
            Stage::AssessmentActive => handle_assessment_answer(user_input, session, action),
            Stage::AssessmentComplete => {
                session.stage = Stage::Recommendations;
                recommendations_reply(session)
            }
            Stage::Recommendations => handle_recommendations(user_input, session),
            Stage::Error => handle_error(user_input, session),
        };

        if session.stage != before {
            tracing::debug!(session = session_id, from = ?before, to = ?session.stage, "consultation stage changed");
        }
        reply
    }

    pub fn session(&self, session_id: &str) -> Option<&ConsultationSession> {
        self.sessions.get(session_id)
    }

    /// Drop a session; the next message starts again at welcome.
    pub fn reset(&mut self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn is_restart(input: &str) -> bool {
    matches!(input.trim(), "start_new_consultation" | "restart_consultation")
}

fn restart(session: &mut ConsultationSession) -> ConsultationReply {
    *session = ConsultationSession::new(&session.session_id);
    name_form_reply()
}

fn handle_welcome(
    input: &str,
    session: &mut ConsultationSession,
    action: ActionType,
) -> ConsultationReply {
    let name = match action {
        ActionType::FormSubmit => serde_json::from_str::<serde_json::Value>(input)
            .ok()
            .and_then(|v| v.get("name").and_then(|n| n.as_str()).map(str::trim).map(String::from))
            .filter(|n| !n.is_empty()),
        ActionType::Text => extract_name(input),
        ActionType::ButtonClick => None,
    };

    match name {
        Some(name) => {
            session.data.insert("name".to_string(), name);
            session.stage = Stage::BasicInfo;
            basic_info_reply(session)
        }
        None => name_form_reply(),
    }
}

fn handle_basic_info(
    input: &str,
    session: &mut ConsultationSession,
    action: ActionType,
) -> ConsultationReply {
    match action {
        ActionType::FormSubmit => {
            let fields = match serde_json::from_str::<serde_json::Value>(input) {
                Ok(serde_json::Value::Object(fields)) => fields,
                _ => return error_reply(session, "Invalid form data"),
            };
            for (key, value) in fields {
                if let serde_json::Value::String(s) = value {
                    session.data.insert(key, s);
                }
            }
            session.stage = Stage::AssessmentIntro;
            return assessment_intro_reply(session);
        }
        ActionType::ButtonClick => {
            let input = input.trim();
            if let Some(age) = input.strip_prefix("age_") {
                session.data.insert("age_range".to_string(), age.to_string());
            } else if let Some(level) = input.strip_prefix("level_") {
                session.data.insert("level".to_string(), level.to_string());
            }
        }
        ActionType::Text => {
            if let Some(level) = level_from_text(input) {
                session.data.insert("level".to_string(), level.to_string());
            }
            if let Some(age) = age_range_from_text(input) {
                session.data.insert("age_range".to_string(), age.to_string());
            }
        }
    }

    if session.data.contains_key("age_range") && session.data.contains_key("level") {
        session.stage = Stage::AssessmentIntro;
        return assessment_intro_reply(session);
    }
    basic_info_reply(session)
}

fn handle_assessment_intro(
    input: &str,
    session: &mut ConsultationSession,
    action: ActionType,
) -> ConsultationReply {
    let lower = input.to_lowercase();
    let start = (action == ActionType::ButtonClick && input.trim() == "start_assessment")
        || ["start", "begin", "yes", "ready"]
            .iter()
            .any(|w| lower.contains(w));
    let skip = (action == ActionType::ButtonClick && input.trim() == "skip_assessment")
        || ["skip", "no", "later"].iter().any(|w| lower.contains(w));

    if start && !lower.contains("skip") {
        session.stage = Stage::AssessmentActive;
        session.current_question = 0;
        session.assessment_answers.clear();
        return question_reply(session, None);
    }
    if skip {
        let level = match session.data.get("level").map(String::as_str) {
            None | Some("unsure") => "intermediate".to_string(),
            Some(level) => level.to_string(),
        };
        session.assessed_level = Some(level);
        session.stage = Stage::Recommendations;
        return recommendations_reply(session);
    }
    assessment_intro_reply(session)
}

fn handle_assessment_answer(
    input: &str,
    session: &mut ConsultationSession,
    action: ActionType,
) -> ConsultationReply {
    let choice = match action {
        ActionType::ButtonClick if input.trim().starts_with("answer_") => input
            .trim()
            .trim_start_matches("answer_")
            .parse::<usize>()
            .ok(),
        _ => extract_choice(input),
    };

    let Some(question) = ASSESSMENT_QUESTIONS.get(session.current_question) else {
        return complete_assessment(session);
    };

    match choice {
        Some(choice) if (1..=question.options.len()).contains(&choice) => {
            session.assessment_answers.push(AssessmentAnswer {
                question: session.current_question,
                choice,
                correct: choice == question.correct_answer,
            });
            session.current_question += 1;
            if session.current_question >= ASSESSMENT_QUESTIONS.len() {
                complete_assessment(session)
            } else {
                question_reply(session, None)
            }
        }
        _ => question_reply(session, Some(INVALID_CHOICE_PREFIX)),
    }
}

fn handle_recommendations(input: &str, session: &mut ConsultationSession) -> ConsultationReply {
    if is_restart(input) {
        return restart(session);
    }
    recommendations_reply(session)
}

fn handle_error(input: &str, session: &mut ConsultationSession) -> ConsultationReply {
    if is_restart(input) {
        return restart(session);
    }
    let message = session
        .error_message
        .clone()
        .unwrap_or_else(|| "something went wrong".to_string());
    error_reply(session, &message)
}

fn complete_assessment(session: &mut ConsultationSession) -> ConsultationReply {
    let correct = session.assessment_answers.iter().filter(|a| a.correct).count();
    let total = session.assessment_answers.len();
    let percentage = if total > 0 { correct * 100 / total } else { 0 };
    let level = level_for_score(percentage);

    let result = AssessmentResult {
        correct,
        total,
        percentage,
        level: level.to_string(),
    };
    session.assessed_level = Some(level.to_string());
    session.assessment_results = Some(result.clone());
    session.stage = Stage::AssessmentComplete;
    tracing::info!(session = %session.session_id, correct, total, level, "assessment complete");

    ConsultationReply {
        response: format!(
            "Assessment Complete! 🎉\n\nYou scored {}/{} ({}%)\nRecommended level: {}",
            correct,
            total,
            percentage,
            title_case(level)
        ),
        ui_elements: UiElements::ResultsDisplay {
            score: result,
            next_button: Button::click("see_recommendations", "See My Recommendations")
                .styled("primary"),
        },
        stage: Stage::AssessmentComplete,
        allow_text_input: false,
        text_fallback: None,
    }
}

fn name_form_reply() -> ConsultationReply {
    ConsultationReply {
        response: "I'd love to help you find the perfect English program! Let's start with some basic information.".to_string(),
        ui_elements: UiElements::Form {
            fields: vec![FormField {
                id: "name".to_string(),
                kind: "text".to_string(),
                label: "What's your name (or your child's name)?".to_string(),
                placeholder: "Enter name here...".to_string(),
                required: true,
            }],
            submit_button: "Continue".to_string(),
            action: "submit_name".to_string(),
        },
        stage: Stage::Welcome,
        allow_text_input: true,
        text_fallback: Some("You can also just type your name if you prefer.".to_string()),
    }
}

fn basic_info_reply(session: &mut ConsultationSession) -> ConsultationReply {
    let needs_age = !session.data.contains_key("age_range");
    let needs_level = !session.data.contains_key("level");

    let response = match (needs_age, needs_level) {
        (true, true) => format!(
            "Thanks {}! Now I need to know a bit more to give you the best recommendations.",
            session.name()
        ),
        (true, false) => "Great! Just need to know the age range.".to_string(),
        (false, true) => "Perfect! Last question - what's the current English level?".to_string(),
        (false, false) => {
            session.stage = Stage::AssessmentIntro;
            return assessment_intro_reply(session);
        }
    };

    let mut sections = Vec::new();
    if needs_age {
        sections.push(ButtonSection {
            title: "Age Range".to_string(),
            kind: "button_grid".to_string(),
            buttons: ["3-6", "7-10", "11-14", "15-18"]
                .iter()
                .map(|range| Button::click(&format!("age_{}", range), &format!("{} years", range)))
                .collect(),
        });
    }
    if needs_level {
        sections.push(ButtonSection {
            title: "Current English Level".to_string(),
            kind: "button_grid".to_string(),
            buttons: vec![
                Button::click("level_beginner", "Beginner").subtitle("Just starting out"),
                Button::click("level_intermediate", "Intermediate")
                    .subtitle("Can have basic conversations"),
                Button::click("level_advanced", "Advanced").subtitle("Comfortable with most topics"),
                Button::click("level_unsure", "Not Sure")
                    .subtitle("Let's find out with the assessment!"),
            ],
        });
    }

    ConsultationReply {
        response,
        ui_elements: UiElements::MultiSection { sections },
        stage: Stage::BasicInfo,
        allow_text_input: true,
        text_fallback: Some("You can also type your answer if you prefer.".to_string()),
    }
}

fn assessment_intro_reply(session: &ConsultationSession) -> ConsultationReply {
    let name = session.name();
    let response = match session.data.get("level").map(String::as_str) {
        Some("unsure") | None => format!(
            "Perfect {}! Let's do a quick 5-question assessment to determine the best level. It will only take about 2 minutes.",
            name
        ),
        Some(level) => format!(
            "Great {}! Even though you mentioned {} level, I'd recommend doing a quick assessment to ensure we get you the perfect match. It's just 5 questions and takes about 2 minutes.",
            name, level
        ),
    };

    ConsultationReply {
        response,
        ui_elements: UiElements::ActionButtons {
            buttons: vec![
                Button::click("start_assessment", "Start Assessment").styled("primary"),
                Button::click("skip_assessment", "Skip Assessment").styled("secondary"),
            ],
        },
        stage: Stage::AssessmentIntro,
        allow_text_input: false,
        text_fallback: None,
    }
}

fn question_reply(session: &ConsultationSession, prefix: Option<&str>) -> ConsultationReply {
    let total = ASSESSMENT_QUESTIONS.len();
    let index = session.current_question.min(total.saturating_sub(1));
    let question = &ASSESSMENT_QUESTIONS[index];
    let current = index + 1;

    let mut response = format!("Question {} of {}:\n\n{}", current, total, question.question);
    if let Some(prefix) = prefix {
        response = format!("{}\n\n{}", prefix, response);
    }

    let answers = question
        .options
        .iter()
        .enumerate()
        .map(|(i, option)| {
            Button::click(&format!("answer_{}", i + 1), &format!("{}. {}", i + 1, option))
                .styled("answer_option")
        })
        .collect();

    ConsultationReply {
        response,
        ui_elements: UiElements::QuestionInterface {
            progress: Progress {
                current,
                total,
                percentage: current * 100 / total,
            },
            answers,
        },
        stage: Stage::AssessmentActive,
        allow_text_input: true,
        text_fallback: Some("You can also type 1, 2, or 3 for your answer.".to_string()),
    }
}

fn recommendations_reply(session: &ConsultationSession) -> ConsultationReply {
    let level = session.effective_level();
    let courses = courses_for_level(&level)
        .iter()
        .map(|course| Button {
            id: format!("course_{}", course.id),
            text: course.name.to_string(),
            subtitle: Some(format!("{} • {}", course.duration, course.schedule)),
            description: Some(course.description.to_string()),
            action: "view_course_details".to_string(),
            style: Some("course_card".to_string()),
        })
        .collect();

    ConsultationReply {
        response: format!(
            "Based on your assessment, {}, here are my personalized course recommendations for {} level:",
            session.name(),
            level
        ),
        ui_elements: UiElements::CourseRecommendations {
            courses,
            action_buttons: vec![
                Button::click("contact_advisor", "Speak with an Advisor").styled("primary"),
                Button::click("start_new_consultation", "Start New Consultation")
                    .styled("secondary"),
            ],
        },
        stage: Stage::Recommendations,
        allow_text_input: true,
        text_fallback: None,
    }
}

fn error_reply(session: &mut ConsultationSession, message: &str) -> ConsultationReply {
    tracing::warn!(session = %session.session_id, reason = message, "consultation error");
    session.stage = Stage::Error;
    session.error_message = Some(message.to_string());

    ConsultationReply {
        response: format!("I'm sorry, {}. Let's start over.", message),
        ui_elements: UiElements::ActionButtons {
            buttons: vec![
                Button::click("restart_consultation", "Start New Consultation").styled("primary")
            ],
        },
        stage: Stage::Error,
        allow_text_input: false,
        text_fallback: None,
    }
}

/// Pull a first name out of free text, title-cased.
pub fn extract_name(text: &str) -> Option<String> {
    let lower = text.trim().to_lowercase();
    NAME_PATTERNS.iter().find_map(|re| {
        re.captures(&lower)
            .and_then(|c| c.get(1))
            .map(|m| title_case(m.as_str()))
    })
}

fn extract_choice(text: &str) -> Option<usize> {
    CHOICE_PATTERN
        .as_ref()?
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
}

fn level_from_text(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    if lower.contains("not sure") || lower.contains("unsure") {
        Some("unsure")
    } else if lower.contains("beginner") {
        Some("beginner")
    } else if lower.contains("intermediate") {
        Some("intermediate")
    } else if lower.contains("advanced") {
        Some("advanced")
    } else {
        None
    }
}

fn age_range_from_text(text: &str) -> Option<&'static str> {
    let age: u32 = AGE_PATTERN
        .as_ref()?
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()?;
    match age {
        3..=6 => Some("3-6"),
        7..=10 => Some("7-10"),
        11..=14 => Some("11-14"),
        15..=18 => Some("15-18"),
        _ => None,
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
