pub mod course;
pub mod course_type;

pub use course::{
    CourseDetails, CourseEntry, CourseStatus, DEFAULT_COURSE_NAME, StatusRecord,
    validate_course_id,
};
pub use course_type::{CourseType, CourseTypeInfo};
