//! Command-line surface for `atelier-cli`.

#![deny(clippy::all, clippy::pedantic)]

use std::path::PathBuf;

use atelier::config::ConfigOverrides;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "atelier-cli", version, about = "Atelier platform CLI", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigOverrides,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Journal management
    Journals(JournalsArgs),
    /// Post management
    Posts(PostsArgs),
    /// Project management
    Projects(ProjectsArgs),
    /// Category management
    Categories(CategoriesArgs),
    /// Site-wide settings
    Settings(SettingsArgs),
    /// Follow relationships
    Follow(FollowArgs),
}

#[derive(Parser, Debug)]
pub struct JournalsArgs {
    #[command(subcommand)]
    pub action: JournalsCmd,
}

#[derive(Subcommand, Debug)]
pub enum JournalsCmd {
    /// List journals, optionally for one author
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        author: Option<i64>,
    },
    /// Get a journal by id
    Get { id: i64 },
    /// Create a journal owned by `--author`
    Create {
        #[arg(long)]
        author: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        description_file: Option<PathBuf>,
    },
    /// Update a journal
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        description_file: Option<PathBuf>,
    },
    /// Delete a journal
    Delete { id: i64 },
}

#[derive(Parser, Debug)]
pub struct PostsArgs {
    #[command(subcommand)]
    pub action: PostsCmd,
}

#[derive(Subcommand, Debug)]
pub enum PostsCmd {
    /// List posts, optionally within a journal or project
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, conflicts_with = "project")]
        journal: Option<i64>,
        #[arg(long)]
        project: Option<i64>,
    },
    /// Get a post by id
    Get { id: i64 },
    /// Create a post
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        body_file: Option<PathBuf>,
        #[arg(long)]
        journal: Option<i64>,
        #[arg(long)]
        project: Option<i64>,
    },
    /// Update a post
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        body_file: Option<PathBuf>,
    },
    /// Delete a post
    Delete { id: i64 },
}

#[derive(Parser, Debug)]
pub struct ProjectsArgs {
    #[command(subcommand)]
    pub action: ProjectsCmd,
}

#[derive(Subcommand, Debug)]
pub enum ProjectsCmd {
    /// List projects, optionally for one owner
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        owner: Option<i64>,
    },
    /// Get a project by id
    Get { id: i64 },
    /// Create a project
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        summary: Option<String>,
        /// Category id; repeat for several
        #[arg(long = "category")]
        categories: Vec<i64>,
    },
    /// Update a project
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        summary: Option<String>,
        /// Replace the category set; repeat for several
        #[arg(long = "category")]
        categories: Option<Vec<i64>>,
    },
    /// Delete a project
    Delete { id: i64 },
}

#[derive(Parser, Debug)]
pub struct CategoriesArgs {
    #[command(subcommand)]
    pub action: CategoriesCmd,
}

#[derive(Subcommand, Debug)]
pub enum CategoriesCmd {
    /// List all categories
    List,
    /// Create a category
    Create {
        #[arg(long)]
        name: String,
    },
    /// Rename a category
    Update {
        id: i64,
        #[arg(long)]
        name: String,
    },
    /// Delete a category
    Delete { id: i64 },
}

#[derive(Parser, Debug)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub action: SettingsCmd,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCmd {
    /// Show site settings
    Get,
    /// Update site settings
    Update {
        #[arg(long)]
        site_name: Option<String>,
        #[arg(long)]
        tagline: Option<String>,
        #[arg(long)]
        registrations_open: Option<bool>,
    },
}

#[derive(Parser, Debug)]
pub struct FollowArgs {
    #[command(subcommand)]
    pub action: FollowCmd,
}

#[derive(Subcommand, Debug)]
pub enum FollowCmd {
    /// Show whether the viewer follows a user
    Status { user: i64 },
    /// Follow or unfollow a user, whichever flips the current state
    Toggle { user: i64 },
}
