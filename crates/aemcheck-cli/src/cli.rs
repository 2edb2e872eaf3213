use aemcheck_domain::OsType;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "aemcheck",
    about = "Verify Azure Enhanced Monitoring on SAP virtual machines",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub azure: AzureArgs,

    /// YAML settings file. Built-in defaults are used when omitted.
    #[arg(long, env = "AEMCHECK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Print verbose progress messages.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Credentials for the ARM storage account listing.
#[derive(Debug, Clone, Args)]
pub struct AzureArgs {
    /// Subscription that owns the storage accounts.
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID", global = true)]
    pub subscription_id: Option<String>,

    /// Tenant for service principal authentication.
    #[arg(long, env = "AZURE_TENANT_ID", global = true)]
    pub tenant_id: Option<String>,

    /// Service principal client ID (falls back to managed identity, then the Azure CLI).
    #[arg(long, env = "AZURE_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Service principal client secret.
    #[arg(long, env = "AZURE_CLIENT_SECRET", global = true, hide_env_values = true)]
    pub client_secret: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the expected IOPS and throughput SLA of a VM and its disks.
    Sla {
        /// VM descriptor (`az vm show -o json`).
        #[arg(long)]
        vm: PathBuf,
    },

    /// Wait until the diagnostics tables for a VM hold recent rows.
    Verify {
        /// VM descriptor (`az vm show -o json`).
        #[arg(long)]
        vm: PathBuf,

        /// Storage account the diagnostics extension writes to.
        #[arg(long)]
        account: String,

        /// Override the OS type reported by the VM.
        #[arg(long)]
        os_type: Option<OsTypeArg>,

        /// Overall wait budget shared by every table.
        #[arg(long)]
        timeout_minutes: Option<u64>,

        /// Override the deployment id (defaults to the VM resource id).
        #[arg(long)]
        deployment_id: Option<String>,

        /// Override the host (defaults to the VM name).
        #[arg(long)]
        host: Option<String>,
    },

    /// Wait until one table holds an entity matching a filter.
    WaitTable {
        /// Storage account holding the table.
        #[arg(long)]
        account: String,

        /// Exact table name.
        #[arg(long, required_unless_present = "discover", conflicts_with = "discover")]
        table: Option<String>,

        /// Use the first table named with the configured metrics prefix.
        #[arg(long)]
        discover: bool,

        /// OData filter expression.
        #[arg(long)]
        filter: String,

        #[arg(long)]
        timeout_minutes: Option<u64>,
    },

    /// Check a WAD configuration XML document.
    AuditWad {
        /// File holding the XML document.
        file: PathBuf,
    },

    /// Check the blob service analytics settings of a storage account.
    AuditStorage {
        #[arg(long)]
        account: String,
    },

    /// Check one `cfg` property of an installed VM extension.
    CheckExtension {
        /// VM descriptor (`az vm show -o json`).
        #[arg(long)]
        vm: PathBuf,

        /// Instance view (`az vm get-instance-view -o json`), to report the extension status.
        #[arg(long)]
        view: Option<PathBuf>,

        /// Extension type, e.g. AzureEnhancedMonitorForLinux.
        #[arg(long = "type")]
        extension_type: String,

        /// Extension publisher, e.g. Microsoft.OSTCExtensions.
        #[arg(long)]
        publisher: String,

        /// JSON settings document to inspect instead of the extension's public settings.
        #[arg(long)]
        properties: Option<PathBuf>,

        /// Property key to look up.
        #[arg(long)]
        key: String,

        /// Label printed next to the result (defaults to the key).
        #[arg(long)]
        label: Option<String>,

        /// Value the property must have.
        #[arg(long)]
        expected: Option<String>,

        /// Also record a pass when the property is merely present.
        #[arg(long)]
        exists: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OsTypeArg {
    Linux,
    Windows,
}

impl From<OsTypeArg> for OsType {
    fn from(arg: OsTypeArg) -> Self {
        match arg {
            OsTypeArg::Linux => OsType::Linux,
            OsTypeArg::Windows => OsType::Windows,
        }
    }
}
