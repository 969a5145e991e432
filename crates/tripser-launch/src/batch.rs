//! SLURM batch jobs that run the crawler under an MPI launcher.

use crate::error::{LaunchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A SLURM time limit, stored in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallTime(u64);

impl WallTime {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn hours(hours: u64) -> Self {
        Self(hours.saturating_mul(3600))
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }
}

impl FromStr for WallTime {
    type Err = LaunchError;

    /// Accepts `M`, `M:S`, `H:M:S`, `D-H`, `D-H:M` and `D-H:M:S`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || LaunchError::InvalidWalltime(s.to_string());
        let number = |part: &str| part.trim().parse::<u64>().map_err(|_| invalid());
        let total = |days: u64, h: u64, m: u64, sec: u64| {
            days.checked_mul(86_400)?
                .checked_add(h.checked_mul(3600)?)?
                .checked_add(m.checked_mul(60)?)?
                .checked_add(sec)
        };

        let secs = match s.trim().split_once('-') {
            Some((days, rest)) => {
                let days = number(days)?;
                let parts: Vec<&str> = rest.split(':').collect();
                let (h, m, sec) = match parts.as_slice() {
                    [h] => (number(h)?, 0, 0),
                    [h, m] => (number(h)?, number(m)?, 0),
                    [h, m, sec] => (number(h)?, number(m)?, number(sec)?),
                    _ => return Err(invalid()),
                };
                total(days, h, m, sec)
            }
            None => {
                let parts: Vec<&str> = s.trim().split(':').collect();
                match parts.as_slice() {
                    [m] => total(0, 0, number(m)?, 0),
                    [m, sec] => total(0, 0, number(m)?, number(sec)?),
                    [h, m, sec] => total(0, number(h)?, number(m)?, number(sec)?),
                    _ => return Err(invalid()),
                }
            }
        };

        secs.map(Self).ok_or_else(invalid)
    }
}

impl fmt::Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = self.0 / 86_400;
        let hours = (self.0 % 86_400) / 3600;
        let minutes = (self.0 % 3600) / 60;
        let seconds = self.0 % 60;
        if days > 0 {
            write!(f, "{}-{:02}:{:02}:{:02}", days, hours, minutes, seconds)
        } else {
            write!(f, "{:02}:{:02}:{:02}", hours, minutes, seconds)
        }
    }
}

impl TryFrom<String> for WallTime {
    type Error = LaunchError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<WallTime> for String {
    fn from(value: WallTime) -> Self {
        value.to_string()
    }
}

/// The message-passing launcher line of a batch script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Launcher {
    pub program: String,
    pub processes: u32,
    pub command: Vec<String>,
}

impl Default for Launcher {
    fn default() -> Self {
        Self {
            program: "mpirun".to_string(),
            processes: 200,
            command: [
                "tripser",
                "crawl",
                "http://pflu.evolbio.mpg.de/web-services/content/v0.1/",
                "--out",
                "pflu_slurm.ttl",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

impl Launcher {
    pub fn render(&self) -> String {
        let mut parts = vec![
            shell_quote(&self.program),
            "-np".to_string(),
            self.processes.to_string(),
        ];
        parts.extend(self.command.iter().map(|arg| shell_quote(arg)));
        parts.join(" ")
    }
}

/// A batch job description for the SLURM scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchJob {
    pub job_name: String,
    pub ntasks: u32,
    pub cpus_per_task: u32,
    pub nodes: u32,
    pub time_limit: WallTime,
    pub partition: String,
    pub output: String,
    /// Conda environment activated before launching.
    pub environment: Option<String>,
    pub launcher: Launcher,
}

impl Default for BatchJob {
    fn default() -> Self {
        Self {
            job_name: "tripser".to_string(),
            ntasks: 200,
            cpus_per_task: 1,
            nodes: 10,
            time_limit: WallTime::hours(1),
            partition: "standard".to_string(),
            output: "tripser-%j.out".to_string(),
            environment: Some("tripser".to_string()),
            launcher: Launcher::default(),
        }
    }
}

impl BatchJob {
    /// Check the job for values the scheduler would reject and for a
    /// launcher that does not use every allocated task.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(LaunchError::InvalidJob(msg));

        if self.ntasks == 0 {
            return invalid("ntasks must be greater than 0".to_string());
        }
        if self.nodes == 0 {
            return invalid("nodes must be greater than 0".to_string());
        }
        if self.nodes > self.ntasks {
            return invalid(format!(
                "{} nodes requested for only {} tasks",
                self.nodes, self.ntasks
            ));
        }
        if self.cpus_per_task == 0 {
            return invalid("cpus-per-task must be greater than 0".to_string());
        }
        if self.time_limit.as_secs() == 0 {
            return invalid("time limit must be greater than 0".to_string());
        }
        if self.partition.trim().is_empty() {
            return invalid("partition must not be empty".to_string());
        }
        if self.launcher.processes != self.ntasks {
            return invalid(format!(
                "{} starts {} processes but the job requests {} tasks",
                self.launcher.program, self.launcher.processes, self.ntasks
            ));
        }
        Ok(())
    }

    pub fn tasks_per_node(&self) -> u32 {
        if self.nodes == 0 {
            return 0;
        }
        self.ntasks.div_ceil(self.nodes)
    }

    /// Render the job as an `sbatch` script.
    pub fn render(&self) -> String {
        let mut script = String::from("#!/bin/bash\n");
        let directives = [
            ("job-name", self.job_name.clone()),
            ("ntasks", self.ntasks.to_string()),
            ("cpus-per-task", self.cpus_per_task.to_string()),
            ("nodes", self.nodes.to_string()),
            ("time", self.time_limit.to_string()),
            ("partition", self.partition.clone()),
            ("output", self.output.clone()),
        ];
        for (key, value) in directives {
            script.push_str(&format!("#SBATCH --{}={}\n", key, value));
        }
        script.push('\n');

        if let Some(environment) = &self.environment {
            script.push_str(&format!("conda activate {}\n\n", shell_quote(environment)));
        }

        script.push_str(&self.launcher.render());
        script.push('\n');
        script
    }

    /// Read a job back from an existing `sbatch` script.
    ///
    /// `--ntasks`, `--time` and `--partition` must be present; other
    /// directives fall back to the scheduler defaults of one node and one
    /// CPU per task.
    pub fn from_script(text: &str) -> Result<Self> {
        let mut job_name = None;
        let mut ntasks = None;
        let mut cpus_per_task = 1;
        let mut nodes = 1;
        let mut time_limit = None;
        let mut partition = None;
        let mut output = "slurm-%j.out".to_string();
        let mut environment = None;
        let mut launcher = None;

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            let line_no = index + 1;

            if let Some(directive) = line.strip_prefix("#SBATCH") {
                let (key, value) = parse_directive(directive.trim())
                    .ok_or_else(|| LaunchError::InvalidJob(format!("line {}: {}", line_no, line)))?;
                if value.is_empty() && VALUE_DIRECTIVES.contains(&key.as_str()) {
                    return Err(LaunchError::InvalidJob(format!(
                        "line {}: --{} needs a value",
                        line_no, key
                    )));
                }
                let count = |v: &str| {
                    v.parse::<u32>().map_err(|_| {
                        LaunchError::InvalidJob(format!("line {}: {} is not a number", line_no, v))
                    })
                };
                match key.as_str() {
                    "job-name" => job_name = Some(value),
                    "ntasks" => ntasks = Some(count(&value)?),
                    "cpus-per-task" => cpus_per_task = count(&value)?,
                    // A node range `min-max`; the minimum is what is guaranteed.
                    "nodes" => nodes = count(value.split('-').next().unwrap_or(&value))?,
                    "time" => time_limit = Some(value.parse()?),
                    "partition" => partition = Some(value),
                    "output" => output = value,
                    _ => {}
                }
                continue;
            }

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let words = split_words(line);
            match words.as_slice() {
                [activate, verb, env, ..]
                    if (activate == "conda" || activate == "source") && verb == "activate" =>
                {
                    environment = Some(env.clone());
                }
                [program, rest @ ..] if is_launcher(program) => {
                    launcher = Some(parse_launcher(program, rest, line_no)?);
                }
                _ => {}
            }
        }

        let missing = |what: &str| LaunchError::InvalidJob(format!("script has no {}", what));

        Ok(Self {
            job_name: job_name.unwrap_or_default(),
            ntasks: ntasks.ok_or_else(|| missing("--ntasks directive"))?,
            cpus_per_task,
            nodes,
            time_limit: time_limit.ok_or_else(|| missing("--time directive"))?,
            partition: partition.ok_or_else(|| missing("--partition directive"))?,
            output,
            environment,
            launcher: launcher.ok_or_else(|| missing("launcher line"))?,
        })
    }
}

const LAUNCHERS: &[&str] = &["mpirun", "mpiexec", "srun"];

/// Launcher options that take the next word as their value.
const LAUNCHER_VALUE_OPTIONS: &[&str] = &[
    "--hostfile",
    "-hostfile",
    "--machinefile",
    "-machinefile",
    "-f",
    "--host",
    "-host",
    "-H",
    "--map-by",
    "--bind-to",
    "--rank-by",
    "--rankfile",
    "-x",
    "--wdir",
    "-wdir",
    "--npernode",
    "-ppn",
    "--mpi",
    "--cpu-bind",
    "-c",
    "-N",
    "--nodes",
];

/// Launcher options that take the next two words (`--mca key value`).
const LAUNCHER_PAIR_OPTIONS: &[&str] = &["--mca", "-mca", "--gmca", "-gmca"];

fn is_launcher(program: &str) -> bool {
    let name = program.rsplit('/').next().unwrap_or(program);
    LAUNCHERS.contains(&name)
}

fn parse_launcher(program: &str, args: &[String], line_no: usize) -> Result<Launcher> {
    let mut processes = None;
    let mut command = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if !command.is_empty() {
            command.push(arg.clone());
            continue;
        }
        let value = match arg.as_str() {
            "-np" | "-n" | "--np" | "--ntasks" => iter.next().cloned(),
            other => other
                .strip_prefix("--np=")
                .or_else(|| other.strip_prefix("--ntasks="))
                .map(String::from),
        };
        match value {
            Some(v) => {
                processes = Some(v.parse::<u32>().map_err(|_| {
                    LaunchError::InvalidJob(format!("line {}: {} is not a process count", line_no, v))
                })?);
            }
            None if LAUNCHER_VALUE_OPTIONS.contains(&arg.as_str()) => {
                iter.next();
            }
            None if LAUNCHER_PAIR_OPTIONS.contains(&arg.as_str()) => {
                iter.next();
                iter.next();
            }
            None if arg.starts_with('-') => {}
            None => command.push(arg.clone()),
        }
    }

    Ok(Launcher {
        program: program.to_string(),
        processes: processes.ok_or_else(|| {
            LaunchError::InvalidJob(format!("line {}: launcher has no process count", line_no))
        })?,
        command,
    })
}

/// Directives read by `from_script`, all of which take a value.
const VALUE_DIRECTIVES: &[&str] = &[
    "job-name",
    "ntasks",
    "cpus-per-task",
    "nodes",
    "time",
    "partition",
    "output",
];

/// Split a directive into its long key and value. Flags such as
/// `--exclusive` come back with an empty value.
fn parse_directive(directive: &str) -> Option<(String, String)> {
    let (flag, value) = match directive.split_once('=') {
        Some((flag, value)) if flag.starts_with("--") => (flag.trim(), value.trim()),
        _ => {
            let mut parts = directive.splitn(2, char::is_whitespace);
            (parts.next()?.trim(), parts.next().unwrap_or("").trim())
        }
    };

    let key = match flag {
        "-J" => "job-name",
        "-n" => "ntasks",
        "-c" => "cpus-per-task",
        "-N" => "nodes",
        "-t" => "time",
        "-p" => "partition",
        "-o" => "output",
        long => long.strip_prefix("--")?,
    };
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

/// Split a command line into words, honouring quotes and backslash
/// escapes outside quotes.
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
                in_word = true;
            }
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=%@,+".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_job_requests_200_tasks_on_10_nodes() {
        let job = BatchJob::default();
        assert_eq!(job.ntasks, 200);
        assert_eq!(job.nodes, 10);
        assert_eq!(job.tasks_per_node(), 20);
        assert_eq!(job.launcher.processes, job.ntasks);
        job.validate().unwrap();
    }

    #[test]
    fn test_launcher_must_match_ntasks() {
        let mut job = BatchJob::default();
        job.ntasks = 100;
        assert!(matches!(job.validate(), Err(LaunchError::InvalidJob(_))));

        job.launcher.processes = 100;
        job.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases: Vec<fn(&mut BatchJob)> = vec![
            |j| j.nodes = 0,
            |j| j.nodes = 201,
            |j| j.cpus_per_task = 0,
            |j| j.time_limit = WallTime::from_secs(0),
            |j| j.partition = " ".to_string(),
        ];
        for mutate in cases {
            let mut job = BatchJob::default();
            mutate(&mut job);
            assert!(job.validate().is_err(), "{:?}", job);
        }
    }

    #[test]
    fn test_render_script() {
        let expected = "\
#!/bin/bash
#SBATCH --job-name=tripser
#SBATCH --ntasks=200
#SBATCH --cpus-per-task=1
#SBATCH --nodes=10
#SBATCH --time=01:00:00
#SBATCH --partition=standard
#SBATCH --output=tripser-%j.out

conda activate tripser

mpirun -np 200 tripser crawl http://pflu.evolbio.mpg.de/web-services/content/v0.1/ --out pflu_slurm.ttl
";
        assert_eq!(BatchJob::default().render(), expected);
    }

    #[test]
    fn test_rendered_script_parses_back() {
        let mut job = BatchJob::default();
        job.job_name = "pflu crawl".to_string();
        job.launcher.command.push("it's".to_string());
        let parsed = BatchJob::from_script(&job.render()).unwrap();
        assert_eq!(parsed, job);
    }

    #[test]
    fn test_parse_short_and_spaced_directives() {
        let script = "\
#!/bin/bash
#SBATCH -n 96
#SBATCH --nodes 2
#SBATCH -c 1
#SBATCH -t 00:03:00
#SBATCH -p highmem
source activate tripser
srun --ntasks=48 tripser crawl http://pflu.evolbio.mpg.de/web-services/content/v0.1/
";
        let job = BatchJob::from_script(script).unwrap();
        assert_eq!(job.ntasks, 96);
        assert_eq!(job.nodes, 2);
        assert_eq!(job.time_limit.as_secs(), 180);
        assert_eq!(job.partition, "highmem");
        assert_eq!(job.environment.as_deref(), Some("tripser"));
        assert_eq!(job.launcher.program, "srun");
        assert_eq!(job.launcher.processes, 48);
        assert_eq!(job.launcher.command[0], "tripser");
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_parse_requires_launcher_and_ntasks() {
        let err = BatchJob::from_script("#SBATCH --ntasks=4\n#SBATCH --time=5\n#SBATCH -p x\n").unwrap_err();
        assert!(err.to_string().contains("launcher"));

        let err = BatchJob::from_script("#SBATCH --time=5\nmpirun -np 4 a.out\n").unwrap_err();
        assert!(err.to_string().contains("--ntasks"));
    }

    #[test]
    fn test_flag_directives_are_ignored() {
        let script = "\
#!/bin/bash
#SBATCH --ntasks=8
#SBATCH --time=10
#SBATCH --partition=standard
#SBATCH --exclusive
#SBATCH --requeue
#SBATCH --oversubscribe
mpirun -np 8 tripser crawl http://pflu.evolbio.mpg.de/web-services/content/v0.1/
";
        let job = BatchJob::from_script(script).unwrap();
        assert_eq!(job.ntasks, 8);
        job.validate().unwrap();

        let err = BatchJob::from_script("#SBATCH --partition\nmpirun -np 4 a.out\n").unwrap_err();
        assert!(err.to_string().contains("--partition needs a value"));
    }

    #[test]
    fn test_launcher_options_with_values() {
        let script = "\
#SBATCH --ntasks=200
#SBATCH --time=1:00:00
#SBATCH --partition=standard
mpirun --hostfile hosts --mca btl self,tcp -np 200 --oversubscribe tripser crawl --out g.ttl
";
        let job = BatchJob::from_script(script).unwrap();
        assert_eq!(job.launcher.program, "mpirun");
        assert_eq!(job.launcher.processes, 200);
        assert_eq!(job.launcher.command, vec!["tripser", "crawl", "--out", "g.ttl"]);
    }

    #[test]
    fn test_walltime_forms() {
        let secs = |s: &str| s.parse::<WallTime>().unwrap().as_secs();
        assert_eq!(secs("30"), 1800);
        assert_eq!(secs("30:15"), 1815);
        assert_eq!(secs("01:00:00"), 3600);
        assert_eq!(secs("2-0"), 172_800);
        assert_eq!(secs("1-2:30"), 95_400);
        assert_eq!(secs("1-02:00:05"), 93_605);
        assert!("".parse::<WallTime>().is_err());
        assert!("1:2:3:4".parse::<WallTime>().is_err());
        assert!("ab:cd".parse::<WallTime>().is_err());
    }

    #[test]
    fn test_walltime_overflow_is_rejected() {
        for huge in ["999999999999999999", "213503982334602-0", "0:307445734561825861:0"] {
            assert!(matches!(
                huge.parse::<WallTime>(),
                Err(LaunchError::InvalidWalltime(s)) if s == huge
            ));
        }
        assert!(BatchJob::from_script("#SBATCH --ntasks=4\n#SBATCH --time=99999999999999999999\n").is_err());
    }

    #[test]
    fn test_walltime_display() {
        assert_eq!(WallTime::from_secs(3600).to_string(), "01:00:00");
        assert_eq!(WallTime::from_secs(93_605).to_string(), "1-02:00:05");
    }

    #[test]
    fn test_job_yaml() {
        let job: BatchJob = serde_yaml::from_str("ntasks: 8\ntime_limit: '2:00:00'\nlauncher:\n  program: mpirun\n  processes: 8\n  command: [a.out]\n").unwrap();
        assert_eq!(job.ntasks, 8);
        assert_eq!(job.time_limit, WallTime::hours(2));
        assert_eq!(job.nodes, 10);

        let yaml = serde_yaml::to_string(&BatchJob::default()).unwrap();
        assert!(yaml.contains("01:00:00"));
    }
}
