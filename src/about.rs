pub const LABPLAN_DISPLAY_VERSION: &str = env!("LABPLAN_DISPLAY_VERSION");
pub const LABPLAN_BUILD_N: &str = env!("LABPLAN_BUILD_N");

pub fn version_cli_text() -> String {
    format!(
        "labplan {}\nBuild {}\nSequencing chip and library layout planner",
        LABPLAN_DISPLAY_VERSION, LABPLAN_BUILD_N
    )
}
