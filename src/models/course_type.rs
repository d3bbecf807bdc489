use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Registration flows offered by the portal. Each maps to one `xkOper` method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CourseType {
    #[default]
    Tjxk,
    Bfak,
    Kzyxk,
    Cxxk,
    Tykxk,
    Qxgxk,
    Cxcy,
}

#[derive(Debug)]
pub struct CourseTypeInfo {
    pub key: &'static str,
    pub method: &'static str,
    pub label: &'static str,
    pub needs_fallback_class: bool,
    pub needs_volunteer_level: bool,
    pub description: &'static str,
}

static TJXK: CourseTypeInfo = CourseTypeInfo {
    key: "TJXK",
    method: "tjxkOper",
    label: "推荐选课",
    needs_fallback_class: true,
    needs_volunteer_level: false,
    description: "Courses recommended for the student's programme",
};

static BFAK: CourseTypeInfo = CourseTypeInfo {
    key: "BFAK",
    method: "bfakOper",
    label: "本方案选课",
    needs_fallback_class: true,
    needs_volunteer_level: false,
    description: "Courses inside the student's own training plan",
};

static KZYXK: CourseTypeInfo = CourseTypeInfo {
    key: "KZYXK",
    method: "kzyxkOper",
    label: "跨专业选课",
    needs_fallback_class: false,
    needs_volunteer_level: false,
    description: "Courses outside the student's plan",
};

static CXXK: CourseTypeInfo = CourseTypeInfo {
    key: "CXXK",
    method: "cxxkOper",
    label: "重修选课",
    needs_fallback_class: true,
    needs_volunteer_level: false,
    description: "Retaking a previously failed course",
};

static TYKXK: CourseTypeInfo = CourseTypeInfo {
    key: "TYKXK",
    method: "tykxkOper",
    label: "体育课选课",
    needs_fallback_class: false,
    needs_volunteer_level: false,
    description: "Physical-education electives",
};

static QXGXK: CourseTypeInfo = CourseTypeInfo {
    key: "QXGXK",
    method: "qxgxkOper",
    label: "全校公选课",
    needs_fallback_class: false,
    needs_volunteer_level: true,
    description: "General-education electives, ranked by volunteer level",
};

static CXCY: CourseTypeInfo = CourseTypeInfo {
    key: "CXCY",
    method: "cxcyOper",
    label: "创新创业选课",
    needs_fallback_class: false,
    needs_volunteer_level: false,
    description: "Innovation and entrepreneurship electives",
};

impl CourseType {
    pub const ALL: [CourseType; 7] = [
        CourseType::Tjxk,
        CourseType::Bfak,
        CourseType::Kzyxk,
        CourseType::Cxxk,
        CourseType::Tykxk,
        CourseType::Qxgxk,
        CourseType::Cxcy,
    ];

    pub fn info(self) -> &'static CourseTypeInfo {
        match self {
            CourseType::Tjxk => &TJXK,
            CourseType::Bfak => &BFAK,
            CourseType::Kzyxk => &KZYXK,
            CourseType::Cxxk => &CXXK,
            CourseType::Tykxk => &TYKXK,
            CourseType::Qxgxk => &QXGXK,
            CourseType::Cxcy => &CXCY,
        }
    }

    pub fn key(self) -> &'static str {
        self.info().key
    }

    pub fn needs_fallback_class(self) -> bool {
        self.info().needs_fallback_class
    }

    pub fn needs_volunteer_level(self) -> bool {
        self.info().needs_volunteer_level
    }
}

impl fmt::Display for CourseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for CourseType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        CourseType::ALL
            .into_iter()
            .find(|t| t.key().eq_ignore_ascii_case(key))
            .ok_or_else(|| AppError::UnknownCourseType(key.to_string()))
    }
}
