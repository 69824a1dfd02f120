use crate::config::Config;
use std::collections::BTreeMap;

/// Job parameters understood by `srun` / `sbatch`, projected from a command's
/// option map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOptions {
    pub name: Option<String>,
    pub partition: Option<String>,
    pub nodes: Option<u32>,
    pub cpus: Option<u32>,
    pub memory: Option<String>,
    pub time: Option<String>,
    pub qos: Option<String>,
    pub account: Option<String>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub work_dir: Option<String>,
    /// Flags with no dedicated field, passed through as typed.
    pub extra_args: Vec<String>,
}

impl JobOptions {
    /// Maps recognized flags to fields. Unknown flags are kept in
    /// `extra_args`, never dropped.
    pub fn from_options(options: &BTreeMap<String, String>) -> Self {
        let mut job = JobOptions::default();

        for (opt, value) in options {
            match opt.as_str() {
                "-J" | "--job-name" => job.name = non_empty(value),
                "-p" | "--partition" => job.partition = non_empty(value),
                "-N" | "--nodes" => job.nodes = parse_count(value),
                "-c" | "--cpus-per-task" => job.cpus = parse_count(value),
                "--mem" => job.memory = non_empty(value),
                "-t" | "--time" => job.time = non_empty(value),
                "--qos" => job.qos = non_empty(value),
                "-A" | "--account" => job.account = non_empty(value),
                "-o" | "--output" => job.output = non_empty(value),
                "-e" | "--error" => job.error = non_empty(value),
                "-D" | "--chdir" => job.work_dir = non_empty(value),
                _ => {
                    job.extra_args.push(opt.clone());
                    if !value.is_empty() {
                        job.extra_args.push(value.clone());
                    }
                }
            }
        }

        job
    }

    /// Fills every unset field that has a configured default.
    pub fn apply_defaults(&mut self, config: &Config) {
        fill(&mut self.partition, &config.default_partition);
        fill(&mut self.memory, &config.default_memory);
        fill(&mut self.time, &config.default_time);
        fill(&mut self.qos, &config.default_qos);
        fill(&mut self.account, &config.default_account);
        if self.nodes.is_none() && config.default_nodes > 0 {
            self.nodes = Some(config.default_nodes);
        }
        if self.cpus.is_none() && config.default_cpus > 0 {
            self.cpus = Some(config.default_cpus);
        }
    }

    /// Renders the options as toolchain arguments, extra arguments last.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let mut push = |flag: &str, value: &Option<String>| {
            if let Some(v) = value {
                args.push(format!("--{flag}={v}"));
            }
        };
        push("job-name", &self.name);
        push("partition", &self.partition);
        push("nodes", &self.nodes.map(|n| n.to_string()));
        push("cpus-per-task", &self.cpus.map(|n| n.to_string()));
        push("mem", &self.memory);
        push("time", &self.time);
        push("qos", &self.qos);
        push("account", &self.account);
        push("output", &self.output);
        push("error", &self.error);
        push("chdir", &self.work_dir);
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_count(value: &str) -> Option<u32> {
    value.parse::<u32>().ok().filter(|n| *n > 0)
}

fn fill(field: &mut Option<String>, default: &str) {
    if field.is_none() && !default.is_empty() {
        *field = Some(default.to_string());
    }
}
