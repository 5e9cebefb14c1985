//! services/api/src/i18n.rs
//!
//! The localized string table feeding the spoken challenge guide. This is a
//! config-data concern: the table maps (language, challenge) to the
//! instruction text handed to the speech adapter.

use std::str::FromStr;
use verifly_core::domain::ChallengeKind;

/// Languages the challenge guide can be spoken in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    Hi,
    Ta,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
            Language::Ta => "ta",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "hi" => Ok(Language::Hi),
            "ta" => Ok(Language::Ta),
            other => Err(format!("unsupported language code '{}'", other)),
        }
    }
}

/// The spoken instruction for a challenge in the requested language.
pub fn challenge_prompt(language: Language, challenge: ChallengeKind) -> &'static str {
    match (language, challenge) {
        (Language::En, ChallengeKind::Smile) => "Please SMILE for the camera!",
        (Language::En, ChallengeKind::Surprise) => "Look SURPRISED!",
        (Language::En, ChallengeKind::Neutral) => "Stay NEUTRAL (Serious face).",

        (Language::Hi, ChallengeKind::Smile) => "कृपया कैमरे के लिए मुस्कुराइए!",
        (Language::Hi, ChallengeKind::Surprise) => "चौंकने का भाव दिखाइए!",
        (Language::Hi, ChallengeKind::Neutral) => "चेहरा सामान्य और गंभीर रखिए।",

        (Language::Ta, ChallengeKind::Smile) => "தயவுசெய்து கேமராவைப் பார்த்து சிரியுங்கள்!",
        (Language::Ta, ChallengeKind::Surprise) => "ஆச்சரியமாகப் பாருங்கள்!",
        (Language::Ta, ChallengeKind::Neutral) => "முகத்தை அமைதியாகவும் கடுமையாகவும் வைத்திருங்கள்.",
    }
}
