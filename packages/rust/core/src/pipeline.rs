//! Per-project pipeline and multi-project run:
//! fetch → resolve → build → write → render → publish.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use projectmap_devops::{DevOpsClient, FetchOptions};
use projectmap_diagram::{DiagramBuilder, DiagramDocument, resolve_associations};
use projectmap_render::Renderer;
use projectmap_shared::{ProjectMapError, ProjectRef, Result, RunId};

use crate::bootstrap::Workspace;
use crate::naming::{AttachmentNamer, file_stem};
use crate::publish::{PublishReport, WikiPublisher};

/// Everything a run needs, assembled once by the caller.
#[derive(Debug)]
pub struct RunContext {
    pub client: DevOpsClient,
    pub builder: DiagramBuilder,
    pub renderer: Renderer,
    pub publisher: WikiPublisher,
    /// Where `.wsd` sources and rendered images are written.
    pub models_dir: PathBuf,
    pub fetch: FetchOptions,
    /// Overall run deadline, measured from the start of [`run`].
    pub run_timeout: Option<Duration>,
    /// Stop after rendering; nothing is written to the wiki.
    pub skip_publish: bool,
    /// Restrict the run to these project names (exact match). Empty means all.
    pub only_projects: Vec<String>,
    pub namer: AttachmentNamer,
}

impl RunContext {
    pub fn new(
        client: DevOpsClient,
        workspace: &Workspace,
        renderer: Renderer,
        page_path: impl Into<String>,
    ) -> Self {
        Self {
            publisher: WikiPublisher::new(client.clone(), page_path),
            client,
            builder: DiagramBuilder::new(workspace.header.clone()),
            renderer,
            models_dir: workspace.models_dir.clone(),
            fetch: FetchOptions::default(),
            run_timeout: None,
            skip_publish: false,
            only_projects: Vec::new(),
            namer: AttachmentNamer::new(),
        }
    }

    /// Local path of the diagram source for `project`.
    pub fn source_path(&self, project: &str) -> PathBuf {
        self.models_dir.join(format!("{}.wsd", file_stem(project)))
    }
}

/// What one successfully processed project produced.
#[derive(Debug, Clone)]
pub struct ProjectSummary {
    pub repositories: usize,
    pub pipelines: usize,
    pub source: PathBuf,
    pub image: PathBuf,
    /// `None` when publishing was skipped.
    pub publish: Option<PublishReport>,
}

/// Result of one project, success or failure.
#[derive(Debug)]
pub struct ProjectOutcome {
    pub project: ProjectRef,
    pub result: Result<ProjectSummary>,
}

/// Aggregate of a full run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub outcomes: Vec<ProjectOutcome>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &ProjectOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ProjectOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// True when every processed project succeeded.
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a project is processed.
    fn project_started(&self, name: &str, current: usize, total: usize);
    /// Called after a project finished, successfully or not.
    fn project_finished(&self, outcome: &ProjectOutcome);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn project_started(&self, _name: &str, _current: usize, _total: usize) {}
    fn project_finished(&self, _outcome: &ProjectOutcome) {}
    fn done(&self, _report: &RunReport) {}
}

/// Keep only the projects named in `only`, in listing order.
///
/// Unknown names are warned about; a filter that matches nothing is an error.
pub fn select_projects(projects: Vec<ProjectRef>, only: &[String]) -> Result<Vec<ProjectRef>> {
    if only.is_empty() {
        return Ok(projects);
    }

    for name in only {
        if !projects.iter().any(|p| &p.name == name) {
            warn!(project = %name, "requested project not found in organization");
        }
    }

    let selected: Vec<ProjectRef> = projects
        .into_iter()
        .filter(|p| only.contains(&p.name))
        .collect();

    if selected.is_empty() {
        return Err(ProjectMapError::validation(format!(
            "none of the requested projects exist: {}",
            only.join(", ")
        )));
    }
    Ok(selected)
}

/// Fetch, resolve and build the diagram for one project.
async fn build_document(
    ctx: &RunContext,
    project: &ProjectRef,
    fetch: &FetchOptions,
) -> Result<(DiagramDocument, usize, usize)> {
    let inventory = ctx.client.fetch_project_inventory(project, fetch).await?;
    let associations = resolve_associations(&inventory.repositories, &inventory.pipelines);
    let document = ctx.builder.build(
        ctx.client.organization(),
        &project.name,
        &inventory.repositories,
        &associations,
    );
    Ok((
        document,
        inventory.repositories.len(),
        associations.pipeline_count(),
    ))
}

/// Run the full pipeline for one project.
#[instrument(skip_all, fields(project = %project.name))]
pub async fn process_project(
    ctx: &RunContext,
    project: &ProjectRef,
    fetch: &FetchOptions,
) -> Result<ProjectSummary> {
    let (document, repositories, pipelines) = build_document(ctx, project, fetch).await?;
    info!(
        repositories,
        pipelines,
        lines = document.line_count(),
        "built diagram"
    );

    let source = ctx.source_path(&project.name);
    document.write_to(&source)?;

    let image = ctx.renderer.render(&source).await?;

    let publish = if ctx.skip_publish {
        info!("publishing skipped");
        None
    } else {
        let attachment = ctx.namer.next_name(&project.name);
        Some(ctx.publisher.publish(project, &image, &attachment).await?)
    };

    Ok(ProjectSummary {
        repositories,
        pipelines,
        source,
        image,
        publish,
    })
}

/// Process every (selected) project in the organization, one at a time.
///
/// Only a failed project listing aborts the run. Each project's failure is
/// recorded in its [`ProjectOutcome`] and the run moves on.
#[instrument(skip_all)]
pub async fn run(ctx: &RunContext, progress: &dyn ProgressReporter) -> Result<RunReport> {
    let start = Instant::now();
    let run_id = RunId::new();
    let deadline = ctx
        .run_timeout
        .map(|t| tokio::time::Instant::now() + t);
    let fetch = FetchOptions {
        deadline: deadline.or(ctx.fetch.deadline),
        ..ctx.fetch.clone()
    };

    info!(%run_id, organization = %ctx.client.organization(), "starting run");

    progress.phase("Listing projects");
    let projects = select_projects(ctx.client.list_projects().await?, &ctx.only_projects)?;
    let total = projects.len();

    let mut outcomes = Vec::with_capacity(total);
    for (i, project) in projects.into_iter().enumerate() {
        progress.project_started(&project.name, i + 1, total);

        let result = match fetch.deadline {
            Some(d) if tokio::time::Instant::now() >= d => Err(ProjectMapError::Network(
                "run deadline expired before project started".into(),
            )),
            _ => process_project(ctx, &project, &fetch).await,
        };

        match &result {
            Ok(summary) => info!(
                project = %project.name,
                repositories = summary.repositories,
                pipelines = summary.pipelines,
                "project complete"
            ),
            Err(e) => error!(project = %project.name, error = %e, "project failed"),
        }

        let outcome = ProjectOutcome { project, result };
        progress.project_finished(&outcome);
        outcomes.push(outcome);
    }

    let report = RunReport {
        run_id,
        outcomes,
        elapsed: start.elapsed(),
    };

    info!(
        run_id = %report.run_id,
        succeeded = report.succeeded().count(),
        failed = report.failed().count(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "run complete"
    );

    progress.done(&report);
    Ok(report)
}

/// Build one project's diagram without writing, rendering or publishing.
///
/// The project is addressed by name only; no project listing is made.
pub async fn preview_project(ctx: &RunContext, name: &str) -> Result<DiagramDocument> {
    let project = ProjectRef::new("", name);
    let (document, _, _) = build_document(ctx, &project, &ctx.fetch).await?;
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use projectmap_shared::PlatformConfig;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fixture(name: &str) -> String {
        let path = format!("{}/../../../fixtures/json/{name}", env!("CARGO_MANIFEST_DIR"));
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn json(body: String) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body, "application/json")
    }

    fn context(server: &MockServer, root: &std::path::Path) -> RunContext {
        let platform = PlatformConfig::new(&format!("{}/Contoso/", server.uri()), "builder", "pat")
            .expect("platform");
        let workspace = Workspace {
            models_dir: root.join("models"),
            logs_dir: root.join("logs"),
            header: "@startwbs".into(),
        };
        std::fs::create_dir_all(&workspace.models_dir).unwrap();

        let renderer = Renderer {
            command: "sh".into(),
            args: vec![
                "-c".into(),
                r#"printf 'PNG' > "${1%.wsd}.png""#.into(),
                "fake-plantuml".into(),
            ],
            timeout: Duration::from_secs(10),
        };
        RunContext::new(
            DevOpsClient::new(&platform).expect("client"),
            &workspace,
            renderer,
            "Project-Structure",
        )
    }

    fn tempdir() -> PathBuf {
        std::env::temp_dir().join(format!("pm-run-{}", uuid::Uuid::now_v7()))
    }

    async fn mount_billing(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/Contoso/_apis/projects"))
            .respond_with(json(fixture("projects.json")))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Contoso/Billing/_apis/git/repositories"))
            .respond_with(json(fixture("repositories.json")))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Contoso/Billing/_apis/build/definitions"))
            .and(query_param("includeAllProperties", "true"))
            .respond_with(json(fixture("definitions_expanded.json")))
            .mount(server)
            .await;
    }

    async fn mount_wiki(server: &MockServer) {
        let root = "/Contoso/Billing/_apis/wiki/wikis";
        Mock::given(method("POST"))
            .and(path(root))
            .respond_with(ResponseTemplate::new(409))
            .mount(server)
            .await;
        Mock::given(method("PUT"))
            .and(path(format!("{root}/Billing.wiki/attachments")))
            .respond_with(ResponseTemplate::new(201))
            .mount(server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{root}/Billing.wiki/pages")))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;
        Mock::given(method("PUT"))
            .and(path(format!("{root}/Billing.wiki/pages")))
            .respond_with(ResponseTemplate::new(201))
            .mount(server)
            .await;
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for Recorder {
        fn phase(&self, name: &str) {
            self.events.lock().unwrap().push(format!("phase:{name}"));
        }
        fn project_started(&self, name: &str, current: usize, total: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("start:{name}:{current}/{total}"));
        }
        fn project_finished(&self, outcome: &ProjectOutcome) {
            let status = if outcome.result.is_ok() { "ok" } else { "failed" };
            self.events
                .lock()
                .unwrap()
                .push(format!("finish:{}:{status}", outcome.project.name));
        }
        fn done(&self, report: &RunReport) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done:{}", report.outcomes.len()));
        }
    }

    #[test]
    fn select_projects_filters_in_listing_order() {
        let projects = vec![
            ProjectRef::new("1", "Billing"),
            ProjectRef::new("2", "Data Platform"),
            ProjectRef::new("3", "Core"),
        ];
        let only = vec!["Core".to_string(), "Billing".to_string(), "Nope".to_string()];

        let names: Vec<String> = select_projects(projects, &only)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Billing", "Core"]);
    }

    #[test]
    fn select_projects_rejects_a_filter_matching_nothing() {
        let err = select_projects(vec![ProjectRef::new("1", "Billing")], &["Nope".to_string()])
            .unwrap_err();
        assert!(matches!(err, ProjectMapError::Validation { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_project_does_not_stop_the_run() {
        let server = MockServer::start().await;
        mount_billing(&server).await;
        mount_wiki(&server).await;
        // Nothing is mounted for "Data Platform": its repository listing 404s.

        let root = tempdir();
        let ctx = context(&server, &root);
        let recorder = Recorder::default();

        let report = run(&ctx, &recorder).await.unwrap();

        assert_eq!(report.outcomes.len(), 2);
        assert!(!report.is_success());

        let billing = report.succeeded().next().expect("billing succeeded");
        assert_eq!(billing.project.name, "Billing");
        let summary = billing.result.as_ref().unwrap();
        assert_eq!(summary.repositories, 2);
        assert_eq!(summary.pipelines, 2);
        assert!(summary.image.is_file());
        let publish = summary.publish.as_ref().expect("published");
        assert!(publish.attachment_name.starts_with("Billing-"));

        let source = std::fs::read_to_string(&summary.source).unwrap();
        assert_eq!(
            source,
            "@startwbs\n\
             + ORGANIZATION: Contoso\n\
             ++ PROJECT: Billing\n\
             +++ REPO: Billing.Api\n\
             ++++ PIPELINE: Build-Api\n\
             ++++ PIPELINE: Release-Api\n\
             +++ REPO: Billing.Web\n\
             @endwbs\n"
        );

        let failed = report.failed().next().expect("data platform failed");
        assert_eq!(failed.project.name, "Data Platform");
        assert_eq!(failed.result.as_ref().unwrap_err().status(), Some(404));

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "phase:Listing projects",
                "start:Billing:1/2",
                "finish:Billing:ok",
                "start:Data Platform:2/2",
                "finish:Data Platform:failed",
                "done:2",
            ]
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn skip_publish_makes_no_wiki_calls() {
        let server = MockServer::start().await;
        mount_billing(&server).await;

        let root = tempdir();
        let mut ctx = context(&server, &root);
        ctx.skip_publish = true;
        ctx.only_projects = vec!["Billing".into()];

        let report = run(&ctx, &SilentProgress).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcomes[0].result.as_ref().unwrap().publish.is_none());

        let requests = server.received_requests().await.unwrap();
        assert!(!requests.iter().any(|r| r.url.path().contains("/_apis/wiki/")));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn failed_listing_aborts_the_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Contoso/_apis/projects"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let root = tempdir();
        let ctx = context(&server, &root);

        let err = run(&ctx, &SilentProgress).await.unwrap_err();
        assert_eq!(err.status(), Some(401));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn expired_deadline_fails_each_project_without_calls() {
        let server = MockServer::start().await;
        mount_billing(&server).await;

        let root = tempdir();
        let mut ctx = context(&server, &root);
        ctx.run_timeout = Some(Duration::ZERO);

        let report = run(&ctx, &SilentProgress).await.unwrap();

        assert_eq!(report.failed().count(), 2);
        assert_eq!(report.run_id.0.get_version_num(), 7);
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1, "only the project listing is made");

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn preview_builds_without_listing_or_writing() {
        let server = MockServer::start().await;
        mount_billing(&server).await;

        let root = tempdir();
        let ctx = context(&server, &root);

        let document = preview_project(&ctx, "Billing").await.unwrap();

        assert_eq!(document.line_count(), 8);
        assert_eq!(document.pipeline_line_count(), 2);
        assert!(!ctx.source_path("Billing").exists());

        let requests = server.received_requests().await.unwrap();
        assert!(!requests.iter().any(|r| r.url.path().ends_with("/_apis/projects")));

        let _ = std::fs::remove_dir_all(&root);
    }
}
