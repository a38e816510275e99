/// Builds the web URL of a pipeline.
///
/// # Arguments
///
/// * `project_url` - Project web URL (e.g., <https://gitlab.com/group/project>)
/// * `pipeline_id` - Numeric pipeline id
///
/// # Returns
///
/// Clickable URL to the pipeline (e.g., <https://gitlab.com/group/project/-/pipelines/123>)
pub fn pipeline_url(project_url: &str, pipeline_id: i64) -> String {
    format!("{}/-/pipelines/{pipeline_id}", trim_slash(project_url))
}

/// Builds the web URL of a job.
///
/// # Arguments
///
/// * `project_url` - Project web URL, the `repository.homepage` of a job hook
/// * `build_id` - Numeric job id
///
/// # Returns
///
/// Clickable URL to the job (e.g., <https://gitlab.com/group/project/-/jobs/456>)
pub fn job_url(project_url: &str, build_id: i64) -> String {
    format!("{}/-/jobs/{build_id}", trim_slash(project_url))
}

fn trim_slash(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}
