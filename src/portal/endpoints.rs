use url::form_urlencoded;

use crate::models::CourseType;

const API_PATH: &str = "/xsxk";
const FALLBACK_HOST: &str = "localhost";

/// Works out the API base from where the client believes it is running.
///
/// Loopback hosts always get plain `http` so a local mock portal works without
/// certificates; anything else honours the given protocol, defaulting to https.
pub fn resolve_base_url(current_host: &str, current_protocol: &str) -> String {
    let host = current_host.trim().trim_end_matches('/');
    let host = if host.is_empty() { FALLBACK_HOST } else { host };

    let protocol = current_protocol
        .trim()
        .trim_end_matches('/')
        .trim_end_matches(':');
    let scheme = if protocol.eq_ignore_ascii_case("http") || is_loopback(host) {
        "http"
    } else {
        "https"
    };

    format!("{}://{}{}", scheme, host, API_PATH)
}

fn is_loopback(host: &str) -> bool {
    let name = if let Some(rest) = host.strip_prefix('[') {
        rest.split(']').next().unwrap_or(rest)
    } else {
        host.split(':').next().unwrap_or(host)
    };
    matches!(name, "localhost" | "127.0.0.1" | "::1")
}

/// Builds request URLs against one API base.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(base: impl Into<String>) -> Self {
        let base: String = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn fallback_classes_url(&self, course_id: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("method", "getFallbackClass")
            .append_pair("id", course_id)
            .finish();
        format!("{}/loadData?{}", self.base, query)
    }

    pub fn registration_url(
        &self,
        course_type: CourseType,
        course_id: &str,
        fallback_class: Option<&str>,
        volunteer_level: u8,
    ) -> String {
        let info = course_type.info();
        let mut query = form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("method", info.method)
            .append_pair("jxbid", course_id);
        if let Some(fallback) = fallback_class {
            query.append_pair("glJxbid", fallback);
        }
        if info.needs_volunteer_level {
            query.append_pair("xkzy", &volunteer_level.to_string());
        }
        format!("{}/xkOper?{}", self.base, query.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_base_url_uses_https_for_portal_hosts() {
        assert_eq!(
            resolve_base_url("jwxt.example.edu.cn", "https:"),
            "https://jwxt.example.edu.cn/xsxk"
        );
        assert_eq!(
            resolve_base_url("jwxt.example.edu.cn/", "ftp"),
            "https://jwxt.example.edu.cn/xsxk"
        );
        assert_eq!(
            resolve_base_url("jwxt.example.edu.cn", "HTTP"),
            "http://jwxt.example.edu.cn/xsxk"
        );
    }

    #[test]
    fn test_resolve_base_url_forces_http_on_loopback() {
        assert_eq!(resolve_base_url("127.0.0.1:8080", "https:"), "http://127.0.0.1:8080/xsxk");
        assert_eq!(resolve_base_url("[::1]:9000", "https"), "http://[::1]:9000/xsxk");
        assert_eq!(resolve_base_url("", "https"), "http://localhost/xsxk");
    }

    #[test]
    fn test_registration_url_for_plain_course() {
        let endpoints = Endpoints::new("https://portal/xsxk/");
        let url = endpoints.registration_url(CourseType::Kzyxk, "MA101", None, 1);
        assert_eq!(url, "https://portal/xsxk/xkOper?method=kzyxkOper&jxbid=MA101");
    }

    #[test]
    fn test_registration_url_with_fallback_and_level() {
        let endpoints = Endpoints::new("https://portal/xsxk");
        let url = endpoints.registration_url(CourseType::Tjxk, "CS201", Some("S 1&2"), 3);
        assert_eq!(
            url,
            "https://portal/xsxk/xkOper?method=tjxkOper&jxbid=CS201&glJxbid=S+1%262"
        );

        let url = endpoints.registration_url(CourseType::Qxgxk, "GE9", None, 3);
        assert_eq!(url, "https://portal/xsxk/xkOper?method=qxgxkOper&jxbid=GE9&xkzy=3");
    }

    #[test]
    fn test_fallback_classes_url() {
        let endpoints = Endpoints::new("http://127.0.0.1:1/xsxk");
        assert_eq!(
            endpoints.fallback_classes_url("CS201"),
            "http://127.0.0.1:1/xsxk/loadData?method=getFallbackClass&id=CS201"
        );
    }
}
