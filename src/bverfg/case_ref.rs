use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Two-digit year the court was founded in. Earlier two-digit years belong
/// to the 21st century.
const FOUNDING_YEAR: u16 = 51;

static CASE_REF_RE: OnceLock<Regex> = OnceLock::new();

fn case_ref_regex() -> &'static Regex {
    CASE_REF_RE.get_or_init(|| {
        Regex::new(r"([12])\s([A-Za-z]+)\s(\d+)/(\d{2})\b").expect("case reference regex is valid")
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaseRefError {
    #[error("no case reference found in {0:?}")]
    NoMatch(String),
    #[error("invalid number {0:?} in case reference")]
    InvalidNumber(String),
}

/// Register sign of a proceeding, e.g. `BvR` for a constitutional complaint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProcedureType {
    Art18GG,
    Parteiverbotsverfahren,
    Wahlpruefungsbeschwerde,
    Praesidentenanklage,
    Organstreit,
    AbstrakteNormenkontrolle,
    BundLaenderStreit,
    OeffentlichRechtlich,
    Richteranklage,
    LandesverfassungsStreitigkeit,
    KonkreteNormenkontrolle,
    Voelkerrechtsbindung,
    Divergenzvorlage,
    VorkonstitutionelleFortgeltung,
    BundesgesetzlichesVerfahren,
    EinstweiligeAnordnung,
    Verfassungsbeschwerde,
    SonstigesVerfahren,
    Dienstunfaehigkeitsfeststellung,
    Plenarentscheidung,
    Prozesskostenhilfe,
    Verzoegerungsruege,
    /// A sign this crate doesn't know, kept verbatim
    Other(String),
}

impl ProcedureType {
    pub fn from_sign(sign: &str) -> Self {
        match sign {
            "BvA" => Self::Art18GG,
            "BvB" => Self::Parteiverbotsverfahren,
            "BvC" => Self::Wahlpruefungsbeschwerde,
            "BvD" => Self::Praesidentenanklage,
            "BvE" => Self::Organstreit,
            "BvF" => Self::AbstrakteNormenkontrolle,
            "BvG" => Self::BundLaenderStreit,
            "BvH" => Self::OeffentlichRechtlich,
            "BvJ" => Self::Richteranklage,
            "BvK" => Self::LandesverfassungsStreitigkeit,
            "BvL" => Self::KonkreteNormenkontrolle,
            "BvM" => Self::Voelkerrechtsbindung,
            "BvN" => Self::Divergenzvorlage,
            "BvO" => Self::VorkonstitutionelleFortgeltung,
            "BvP" => Self::BundesgesetzlichesVerfahren,
            "BvQ" => Self::EinstweiligeAnordnung,
            "BvR" => Self::Verfassungsbeschwerde,
            "BvT" => Self::SonstigesVerfahren,
            "PBvS" => Self::Dienstunfaehigkeitsfeststellung,
            "PBvU" => Self::Plenarentscheidung,
            "PKH" => Self::Prozesskostenhilfe,
            "Vz" => Self::Verzoegerungsruege,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn ref_sign(&self) -> &str {
        match self {
            Self::Art18GG => "BvA",
            Self::Parteiverbotsverfahren => "BvB",
            Self::Wahlpruefungsbeschwerde => "BvC",
            Self::Praesidentenanklage => "BvD",
            Self::Organstreit => "BvE",
            Self::AbstrakteNormenkontrolle => "BvF",
            Self::BundLaenderStreit => "BvG",
            Self::OeffentlichRechtlich => "BvH",
            Self::Richteranklage => "BvJ",
            Self::LandesverfassungsStreitigkeit => "BvK",
            Self::KonkreteNormenkontrolle => "BvL",
            Self::Voelkerrechtsbindung => "BvM",
            Self::Divergenzvorlage => "BvN",
            Self::VorkonstitutionelleFortgeltung => "BvO",
            Self::BundesgesetzlichesVerfahren => "BvP",
            Self::EinstweiligeAnordnung => "BvQ",
            Self::Verfassungsbeschwerde => "BvR",
            Self::SonstigesVerfahren => "BvT",
            Self::Dienstunfaehigkeitsfeststellung => "PBvS",
            Self::Plenarentscheidung => "PBvU",
            Self::Prozesskostenhilfe => "PKH",
            Self::Verzoegerungsruege => "Vz",
            Self::Other(sign) => sign,
        }
    }

    /// German name of the proceeding type. Empty for unknown signs.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Art18GG => "Verwirkung von Grundrechten",
            Self::Parteiverbotsverfahren => "Feststellung der Verfassungswidrigkeit einer Partei",
            Self::Wahlpruefungsbeschwerde => "Beschwerde im Wahlprüfungsverfahren",
            Self::Praesidentenanklage => "Anklage gegen den Bundespräsidenten",
            Self::Organstreit => "Verfassungsstreitigkeit zwischen Bundesorganen",
            Self::AbstrakteNormenkontrolle => "Normenkontrolle auf Antrag von Verfassungsorganen",
            Self::BundLaenderStreit => "Verfassungsstreitigkeiten zwischen Bund und Ländern",
            Self::OeffentlichRechtlich => "Öffentlichrechtliche Streitigkeiten",
            Self::Richteranklage => "Richteranklage",
            Self::LandesverfassungsStreitigkeit => {
                "Landesverfassungsstreitigkeit kraft landesrechtlicher Zuweisung"
            }
            Self::KonkreteNormenkontrolle => "Normenkontrolle auf Vorlage von Gerichten",
            Self::Voelkerrechtsbindung => "Völkerrechtliche Normverifikation",
            Self::Divergenzvorlage => "Divergenzvorlage",
            Self::VorkonstitutionelleFortgeltung => {
                "Fortgelten vorkonstitutionellen Rechts als Bundesrecht"
            }
            Self::BundesgesetzlichesVerfahren => {
                "Sonstiges durch Bundesrecht zugewiesenes Verfahren"
            }
            Self::EinstweiligeAnordnung => {
                "Verfahren über Anträge im Wege der einstweiligen Anordnung"
            }
            Self::Verfassungsbeschwerde => "Verfassungsbeschwerde",
            Self::SonstigesVerfahren => "Sonstiges Verfahren",
            Self::Dienstunfaehigkeitsfeststellung => {
                "Verfahren über die Beendigung des Amtes eines Richters des BVerfG bei \
                 Dienstunfähigkeit oder aus sonstigen Gründen"
            }
            Self::Plenarentscheidung => "Plenarentscheidung",
            Self::Prozesskostenhilfe => "Prozesskostenhilfe",
            Self::Verzoegerungsruege => "Verzögerungsrüge",
            Self::Other(_) => "",
        }
    }
}

/// A file number such as `1 BvR 205/58`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseReference {
    pub senate: u8,
    pub procedure: ProcedureType,
    /// Four-digit year
    pub year: u16,
    pub running_number: u32,
}

impl CaseReference {
    /// Finds the first case reference anywhere in `text`.
    pub fn parse(text: &str) -> Result<Self, CaseRefError> {
        let caps = case_ref_regex()
            .captures(text)
            .ok_or_else(|| CaseRefError::NoMatch(text.to_owned()))?;

        let number = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();

        let senate = number(1)
            .parse::<u8>()
            .map_err(|_| CaseRefError::InvalidNumber(number(1).to_owned()))?;
        let running_number = number(3)
            .parse::<u32>()
            .map_err(|_| CaseRefError::InvalidNumber(number(3).to_owned()))?;
        let two_digit_year = number(4)
            .parse::<u16>()
            .map_err(|_| CaseRefError::InvalidNumber(number(4).to_owned()))?;

        let year = if two_digit_year >= FOUNDING_YEAR {
            1900 + two_digit_year
        } else {
            2000 + two_digit_year
        };

        Ok(Self {
            senate,
            procedure: ProcedureType::from_sign(number(2)),
            year,
            running_number,
        })
    }
}

impl FromStr for CaseReference {
    type Err = CaseRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CaseReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}/{:02}",
            self.senate,
            self.procedure.ref_sign(),
            self.running_number,
            self.year % 100
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_valid_references() {
        let cases = [
            (
                "1 BvR 205/58",
                CaseReference {
                    senate: 1,
                    procedure: ProcedureType::Verfassungsbeschwerde,
                    running_number: 205,
                    year: 1958,
                },
            ),
            (
                "2 BvB 1/13",
                CaseReference {
                    senate: 2,
                    procedure: ProcedureType::Parteiverbotsverfahren,
                    running_number: 1,
                    year: 2013,
                },
            ),
            (
                "Beschluss vom 12. März 2024 - 2 BvL 4/20 -",
                CaseReference {
                    senate: 2,
                    procedure: ProcedureType::KonkreteNormenkontrolle,
                    running_number: 4,
                    year: 2020,
                },
            ),
        ];

        for (input, expected) in cases {
            assert_eq!(CaseReference::parse(input), Ok(expected), "input: {}", input);
        }
    }

    #[test]
    fn test_founding_year_boundary() {
        assert_eq!(CaseReference::parse("1 BvR 1/51").unwrap().year, 1951);
        assert_eq!(CaseReference::parse("1 BvR 1/50").unwrap().year, 2050);
    }

    #[test]
    fn test_invalid_senate_rejected() {
        assert!(matches!(
            CaseReference::parse("3 BvR 3/19"),
            Err(CaseRefError::NoMatch(_))
        ));
    }

    #[test]
    fn test_negative_running_number_rejected() {
        assert!(CaseReference::parse("1 BvR -717/16").is_err());
    }

    #[test]
    fn test_unknown_sign_is_preserved() {
        let parsed: CaseReference = "1 BvX 12/21".parse().unwrap();
        assert_eq!(parsed.procedure, ProcedureType::Other("BvX".into()));
        assert_eq!(parsed.procedure.description(), "");
        assert_eq!(parsed.to_string(), "1 BvX 12/21");
    }

    #[test]
    fn test_display() {
        let recent = CaseReference {
            senate: 2,
            procedure: ProcedureType::KonkreteNormenkontrolle,
            running_number: 4,
            year: 2020,
        };
        let old = CaseReference {
            senate: 2,
            procedure: ProcedureType::VorkonstitutionelleFortgeltung,
            running_number: 3,
            year: 1956,
        };
        let padded = CaseReference {
            senate: 1,
            procedure: ProcedureType::Plenarentscheidung,
            running_number: 1,
            year: 2005,
        };

        assert_eq!(recent.to_string(), "2 BvL 4/20");
        assert_eq!(old.to_string(), "2 BvO 3/56");
        assert_eq!(padded.to_string(), "1 PBvU 1/05");
    }

    #[test]
    fn test_sign_round_trips_for_known_types() {
        for sign in ["BvA", "BvQ", "PBvS", "PKH", "Vz"] {
            assert_eq!(ProcedureType::from_sign(sign).ref_sign(), sign);
        }
    }
}
