use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upstream locales with a translated item feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    Ru,
    De,
    Fr,
    It,
    Es,
    Cn,
    Ko,
    Pt,
}

/// Per-locale wiring: code, upstream subdomain and store column
#[derive(Debug, Clone, Copy)]
pub struct LocaleSpec {
    pub locale: Locale,
    pub code: &'static str,
    pub subdomain: &'static str,
    pub column: &'static str,
}

pub const LOCALES: &[LocaleSpec] = &[
    LocaleSpec { locale: Locale::Ru, code: "ru", subdomain: "ru", column: "name_ru" },
    LocaleSpec { locale: Locale::De, code: "de", subdomain: "de", column: "name_de" },
    LocaleSpec { locale: Locale::Fr, code: "fr", subdomain: "fr", column: "name_fr" },
    LocaleSpec { locale: Locale::It, code: "it", subdomain: "it", column: "name_it" },
    LocaleSpec { locale: Locale::Es, code: "es", subdomain: "es", column: "name_es" },
    LocaleSpec { locale: Locale::Cn, code: "cn", subdomain: "cn", column: "name_cn" },
    LocaleSpec { locale: Locale::Ko, code: "ko", subdomain: "ko", column: "name_ko" },
    LocaleSpec { locale: Locale::Pt, code: "pt", subdomain: "pt", column: "name_pt" },
];

impl Locale {
    pub fn all() -> impl Iterator<Item = Locale> {
        LOCALES.iter().map(|spec| spec.locale)
    }

    pub fn spec(self) -> &'static LocaleSpec {
        // LOCALES is declared in variant order
        &LOCALES[self as usize]
    }

    pub fn code(self) -> &'static str {
        self.spec().code
    }

    /// Host prefix for the locale-scoped feed (`ko` -> `ko.wowhead.com`)
    pub fn subdomain(self) -> &'static str {
        self.spec().subdomain
    }

    /// Store column holding this locale's name
    pub fn column(self) -> &'static str {
        self.spec().column
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_lowercase();
        LOCALES
            .iter()
            .find(|spec| spec.code == code)
            .map(|spec| spec.locale)
            .ok_or_else(|| {
                let known: Vec<&str> = LOCALES.iter().map(|spec| spec.code).collect();
                anyhow::anyhow!("Unknown locale '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}
