//! Interface strings for the course dashboard.
//!
//! English is the canonical language and the fallback for anything a
//! translation does not cover.

/// A supported interface language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    English,
    German,
}

impl Language {
    /// Resolve an ISO 639-1 code; unknown codes are rejected so callers can
    /// fall back explicitly.
    pub fn from_code(code: &str) -> Option<Language> {
        match code {
            "en" => Some(Language::English),
            "de" => Some(Language::German),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::German => "de",
        }
    }

    pub fn native_name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::German => "Deutsch",
        }
    }

    pub fn strings(self) -> &'static Strings {
        match self {
            Language::English => &EN,
            Language::German => &DE,
        }
    }
}

/// Dashboard string table.
pub struct Strings {
    pub dashboard_title: &'static str,
    pub watched: &'static str,
    pub completed: &'static str,
    pub mark_complete: &'static str,
    pub marked_incomplete: &'static str,
    pub retry_hint: &'static str,
}

static EN: Strings = Strings {
    dashboard_title: "Course dashboard",
    watched: "watched",
    completed: "Completed",
    mark_complete: "Marked as complete",
    marked_incomplete: "Marked as not complete",
    retry_hint: "The change could not be saved. Please try again.",
};

static DE: Strings = Strings {
    dashboard_title: "Kursübersicht",
    watched: "angesehen",
    completed: "Abgeschlossen",
    mark_complete: "Als abgeschlossen markiert",
    marked_incomplete: "Als nicht abgeschlossen markiert",
    retry_hint: "Die Änderung konnte nicht gespeichert werden. Bitte erneut versuchen.",
};

/// Localized lesson title; `None` for ids outside the built-in course.
pub fn lesson_title(lang: Language, lesson_id: &str) -> Option<&'static str> {
    match (lang, lesson_id) {
        (Language::English, "lesson1") => Some("Lesson 1: Greetings and introductions"),
        (Language::English, "lesson2") => Some("Lesson 2: Numbers and everyday phrases"),
        (Language::German, "lesson1") => Some("Lektion 1: Begrüßung und Vorstellung"),
        (Language::German, "lesson2") => Some("Lektion 2: Zahlen und Alltagssätze"),
        _ => None,
    }
}
