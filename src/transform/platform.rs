use crate::config::ProjectConfig;

/// Known platform codes and their display names.
const PLATFORM_NAMES: &[(&str, &str)] = &[
    ("android", "Android"),
    ("ios", "iOS"),
    ("harmony", "HarmonyOS"),
    ("wechat-mp", "WeChat Mini Program"),
    ("alipay-mp", "Alipay Mini Program"),
    ("baidu-mp", "Baidu Smart Program"),
    ("quick-app", "Quick App"),
    ("h5", "H5/Web"),
    ("flutter", "Flutter"),
    ("react-native", "React Native"),
    ("uni-app", "Uni-app"),
    ("taro", "Taro"),
];

/// Display name for `code`, or the code itself if it is not a known platform.
pub fn display_name(code: &str) -> &str {
    PLATFORM_NAMES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

pub fn is_known(code: &str) -> bool {
    PLATFORM_NAMES.iter().any(|(known, _)| *known == code)
}

/// One output variant the generator produces code for.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformTarget {
    pub code: String,
    pub display_name: String,
    pub tech_stack: Option<serde_yaml::Value>,
    pub enabled: bool,
}

impl PlatformTarget {
    pub fn resolve(code: &str, config: &ProjectConfig) -> Self {
        Self {
            code: code.to_string(),
            display_name: display_name(code).to_string(),
            tech_stack: config.tech_stack_for(code).cloned(),
            enabled: config.platforms.enabled.iter().any(|c| c == code),
        }
    }
}
