use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sift_client::{ClientConfig, HtmlDocument, HtmlNode, RestPatternStore, open_session};
use sift_core::binding::Binding;
use sift_core::compose::{Combinator, ComposeOptions, compose};
use sift_core::models::{Page, PageId, RuleId, Site};
use sift_core::resolver::{PatternHints, Placement, ReuseMatching, SubpatternResolver, child_path};
use sift_core::session::CrawlerSession;
use sift_core::traits::{Document, ExtractionTrigger};
use sift_core::tree::{PatternTree, TreeRow, delete_pattern};

#[derive(Parser)]
#[command(name = "sift", version, about = "Author structural extraction rules for crawled pages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the structural selector of an element in a local HTML file
    Compose {
        /// HTML file to read
        #[arg(long)]
        html: PathBuf,

        /// CSS selector locating the element (first match is used)
        #[arg(short, long)]
        target: String,

        /// Anchor the selector at the nearest element with an id
        #[arg(long, default_value_t = false)]
        prefer_id: bool,

        /// Join segments with a space instead of " > "
        #[arg(long, default_value_t = false)]
        descendant: bool,
    },

    /// Apply a selector to a local HTML file and list the matches
    Highlight {
        #[arg(long)]
        html: PathBuf,

        #[arg(short, long)]
        selector: String,
    },

    /// Print the rule tree of a page
    Tree {
        #[arg(short, long)]
        page: PageId,

        #[command(flatten)]
        remote: Remote,
    },

    /// Turn an element of a page into a rule
    Pick {
        #[arg(short, long)]
        page: PageId,

        /// Site the page belongs to
        #[arg(long, default_value_t = 1)]
        site: i64,

        /// Read the page from a local file instead of the proxy
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        html: Option<PathBuf>,

        /// Load the page through the sandbox proxy
        #[arg(long)]
        url: Option<String>,

        /// Cookie header the proxy should send
        #[arg(long)]
        cookies: Option<String>,

        /// CSS selector locating the element to pick (first match is used)
        #[arg(short, long)]
        target: String,

        /// Fold the element under this rule instead of detecting reuse
        #[arg(long)]
        parent: Option<RuleId>,

        /// Selector of --parent as the operator sees it (defaults to the stored one)
        #[arg(long, requires = "parent")]
        base: Option<String>,

        /// The page is a login page
        #[arg(long, default_value_t = false)]
        login: bool,

        /// Display name for the new rule
        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value_t = false)]
        prefer_id: bool,

        /// How existing top-level rules are matched: prefix or substring
        #[arg(long, default_value = "prefix")]
        matching: ReuseMatching,

        #[command(flatten)]
        binding: BindingArgs,

        #[command(flatten)]
        remote: Remote,
    },

    /// Delete a rule and everything below it
    Delete {
        #[arg(short, long)]
        page: PageId,

        #[arg(short, long)]
        rule: RuleId,

        #[command(flatten)]
        remote: Remote,
    },

    /// Trigger server-side extraction for a rule
    Extract {
        #[arg(short, long)]
        rule: RuleId,

        #[command(flatten)]
        remote: Remote,
    },
}

/// Rule store and proxy connection settings.
///
/// Flags override the `SIFT_*` environment variables read by
/// [`ClientConfig::from_env`].
#[derive(Args)]
struct Remote {
    /// Rule store base URL [env: SIFT_STORE_URL]
    #[arg(long)]
    store_url: Option<String>,

    /// Sandbox proxy endpoint [env: SIFT_PROXY_URL]
    #[arg(long)]
    proxy_url: Option<String>,

    /// Bearer token for the rule store [env: SIFT_API_TOKEN]
    #[arg(long)]
    api_token: Option<String>,

    /// HTTP timeout in seconds [env: SIFT_HTTP_TIMEOUT_SECS, default: 30]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,
}

impl Remote {
    fn overrides(&self) -> [(&'static str, Option<String>); 4] {
        [
            ("SIFT_STORE_URL", self.store_url.clone()),
            ("SIFT_PROXY_URL", self.proxy_url.clone()),
            ("SIFT_API_TOKEN", self.api_token.clone()),
            ("SIFT_HTTP_TIMEOUT_SECS", self.timeout.map(|t| t.to_string())),
        ]
    }

    fn config(&self) -> Result<ClientConfig> {
        let overrides = self.overrides();
        let config = if overrides.iter().all(|(_, value)| value.is_none()) {
            ClientConfig::from_env()
        } else {
            ClientConfig::from_lookup(|name| {
                overrides
                    .iter()
                    .find(|(key, _)| *key == name)
                    .and_then(|(_, value)| value.clone())
                    .or_else(|| std::env::var(name).ok())
            })
        };
        config.context("Invalid rule store configuration")
    }

    fn store(&self) -> Result<RestPatternStore> {
        self.config()?
            .store()
            .context("Failed to create rule store client")
    }
}

/// What the picked rule maps to.
#[derive(Args)]
struct BindingArgs {
    /// Value typed into the matched input (login pages)
    #[arg(long, conflicts_with_all = ["mapped_type", "mapped_attribute", "function"])]
    input_value: Option<String>,

    /// Entity type populated by the rule
    #[arg(long, requires = "mapped_attribute")]
    mapped_type: Option<String>,

    /// Attribute of --mapped-type populated by the rule
    #[arg(long, requires = "mapped_type")]
    mapped_attribute: Option<String>,

    /// Transformation applied to the extracted value
    #[arg(long, requires = "mapped_attribute")]
    function: Option<String>,
}

impl BindingArgs {
    fn binding(&self) -> Result<Option<Binding>> {
        match (&self.input_value, &self.mapped_type, &self.mapped_attribute) {
            (Some(value), None, None) => Ok(Some(Binding::input(value.clone()))),
            (None, Some(mapped_type), Some(attribute)) => {
                let binding = Binding::mapped(mapped_type.clone(), attribute.clone());
                Ok(Some(match &self.function {
                    Some(f) => binding.with_function(f.clone()),
                    None => binding,
                }))
            }
            (None, None, None) => Ok(None),
            _ => bail!("use either --input-value or --mapped-type with --mapped-attribute"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sift=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compose {
            html,
            target,
            prefer_id,
            descendant,
        } => {
            let mut options = ComposeOptions::default();
            if prefer_id {
                options = options.prefer_id();
            }
            if descendant {
                options = options.with_combinator(Combinator::Descendant);
            }
            println!("{}", compose_in_file(&html, &target, options)?);
        }
        Commands::Highlight { html, selector } => {
            let doc = read_document(&html)?;
            let lines = highlight_lines(&doc, &selector)?;
            println!("{} match(es) for {selector}", lines.len());
            for line in lines {
                println!("  {line}");
            }
        }
        Commands::Tree { page, remote } => {
            let store = remote.store()?;
            let tree = PatternTree::load(&store, page)
                .await
                .with_context(|| format!("Failed to load rules of page {page}"))?;
            if tree.is_empty() {
                println!("No rules for page {page}");
            }
            for line in render_rows(&tree.rows()) {
                println!("{line}");
            }
        }
        Commands::Pick {
            page,
            site,
            html,
            url,
            cookies,
            target,
            parent,
            base,
            login,
            name,
            prefer_id,
            matching,
            binding,
            remote,
        } => {
            let site = Site {
                id: site,
                cookies,
                ..Default::default()
            };
            let page = Page {
                id: page,
                site_id: site.id,
                name: page_name(page),
                url: match (&html, &url) {
                    (_, Some(url)) => url.clone(),
                    (Some(path), None) => format!("file://{}", path.display()),
                    (None, None) => bail!("either --html or --url is required"),
                },
                is_login_page: login,
            };
            let mut options = ComposeOptions::default();
            if prefer_id {
                options = options.prefer_id();
            }

            let session = match &html {
                Some(path) => CrawlerSession::new(site, page, read_document(path)?)?,
                None => {
                    let loader = remote
                        .config()?
                        .loader()
                        .context("Loading pages needs --proxy-url or SIFT_PROXY_URL")?;
                    open_session(&loader, site, page)
                        .await
                        .context("Failed to load page through the proxy")?
                }
            };
            let resolver = SubpatternResolver::new(remote.store()?).with_matching(matching);
            let pick = Pick {
                target,
                parent,
                base,
                name,
                binding: binding.binding()?,
            };
            let placement = cmd_pick(session.with_options(options), &resolver, pick).await?;
            report_placement(&placement);
        }
        Commands::Delete { page, rule, remote } => {
            let store = remote.store()?;
            let mut tree = PatternTree::load(&store, page)
                .await
                .with_context(|| format!("Failed to load rules of page {page}"))?;
            let removed = delete_pattern(&store, &mut tree, rule)
                .await
                .with_context(|| format!("Failed to delete rule {rule}"))?;
            println!("Deleted {} rule(s): {removed:?}", removed.len());
        }
        Commands::Extract { rule, remote } => {
            let store = remote.store()?;
            let report = store
                .extract(rule)
                .await
                .with_context(|| format!("Extraction for rule {rule} failed"))?;
            println!(
                "HTTP {}: {}",
                report.status_code,
                report.message.as_deref().unwrap_or("ok")
            );
        }
    }

    Ok(())
}

fn read_document(path: &Path) -> Result<HtmlDocument> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read HTML file: {}", path.display()))?;
    Ok(HtmlDocument::parse(&source))
}

fn first_match<'a>(doc: &'a HtmlDocument, target: &str) -> Result<HtmlNode<'a>> {
    doc.select(target)?
        .into_iter()
        .next()
        .with_context(|| format!("No element matches '{target}'"))
}

fn compose_in_file(path: &Path, target: &str, options: ComposeOptions) -> Result<String> {
    let doc = read_document(path)?;
    let node = first_match(&doc, target)?;
    Ok(compose(&node, options))
}

fn highlight_lines(doc: &HtmlDocument, selector: &str) -> Result<Vec<String>> {
    let matches = doc.select(selector)?;
    Ok(matches
        .iter()
        .map(|node| {
            let text: String = node.text().chars().take(60).collect();
            format!("{}  {text:?}", compose(node, ComposeOptions::default()))
        })
        .collect())
}

fn render_rows(rows: &[TreeRow]) -> Vec<String> {
    rows.iter()
        .map(|row| {
            let selector = if row.selector.is_empty() {
                "(same elements)"
            } else {
                row.selector.as_str()
            };
            format!(
                "{}[{}] {selector}  =>  {}",
                "  ".repeat(row.depth),
                row.id,
                row.effective_selector
            )
        })
        .collect()
}

struct Pick {
    target: String,
    parent: Option<RuleId>,
    base: Option<String>,
    name: Option<String>,
    binding: Option<Binding>,
}

async fn cmd_pick(
    mut session: CrawlerSession<HtmlDocument>,
    resolver: &SubpatternResolver<RestPatternStore>,
    pick: Pick,
) -> Result<Placement> {
    let page = session.page().id;
    let candidate = session
        .hover_first(&pick.target)?
        .cloned()
        .with_context(|| format!("No element matches '{}'", pick.target))?;
    tracing::info!(selector = %candidate.selector, "Element picked");

    // An explicit base bypasses the stored tree.
    if let (Some(parent), Some(base)) = (pick.parent, &pick.base) {
        if let Some(binding) = &pick.binding {
            binding.validate_for(session.page())?;
        }
        let hints = PatternHints {
            name: pick.name,
            element_id: candidate.element_id,
            element_class: candidate.element_class,
            binding: pick.binding,
        };
        let reuse = child_path(base, &candidate.selector)?.starts_with(':');
        let sub = resolver
            .add_subpattern(base, &candidate.selector, parent, reuse, &hints)
            .await
            .context("Failed to store the rule")?;
        return Ok(Placement::Reused(sub));
    }

    let tree = PatternTree::load(resolver.store(), page)
        .await
        .with_context(|| format!("Failed to load rules of page {page}"))?;
    session.select_row(pick.parent);
    let placement = session
        .click(resolver, &tree, pick.binding)
        .await
        .context("Failed to store the rule")?;
    Ok(placement)
}

/// Pages opened for picking are named after their id.
fn page_name(page: PageId) -> String {
    format!("page-{page}")
}

fn report_placement(placement: &Placement) {
    match placement {
        Placement::Created(rule) => {
            println!("Created top-level rule {}: {}", rule.id, rule.selector);
        }
        Placement::Existing(rule) => {
            println!("Top-level rule {} already covers this element: {}", rule.id, rule.selector);
        }
        Placement::Reused(sub) if sub.created => {
            println!(
                "Added rule {} under {} ({}): {}",
                sub.child.id, sub.parent_id, sub.parent_selector, sub.child.selector
            );
        }
        Placement::Reused(sub) => {
            println!(
                "Rule {} under {} already covers this element",
                sub.child.id, sub.parent_id
            );
        }
    }
}
