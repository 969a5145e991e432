//! Where this process sits in an MPI launch.

use tracing::warn;

/// Rank and world size variables set by the supported launchers, in lookup
/// order: Open MPI, MPICH/Hydra, then `srun`.
const RANK_VARIABLES: &[(&str, &str)] = &[
    ("OMPI_COMM_WORLD_RANK", "OMPI_COMM_WORLD_SIZE"),
    ("PMI_RANK", "PMI_SIZE"),
    ("SLURM_PROCID", "SLURM_NTASKS"),
];

/// This process's rank among the processes a launcher started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpiRank {
    pub rank: u32,
    pub size: u32,
}

impl MpiRank {
    /// Read the rank from the process environment. `None` outside a
    /// launcher.
    pub fn from_env() -> Option<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Read the rank through `lookup`. The first launcher whose rank and
    /// size variables are both set wins; unparsable values are skipped.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        for (rank_var, size_var) in RANK_VARIABLES {
            let (Some(rank), Some(size)) = (lookup(rank_var), lookup(size_var)) else {
                continue;
            };
            match (rank.trim().parse::<u32>(), size.trim().parse::<u32>()) {
                (Ok(rank), Ok(size)) if rank < size => return Some(Self { rank, size }),
                _ => warn!(rank_var, rank = %rank, size_var, size = %size, "Ignoring invalid launcher rank"),
            }
        }
        None
    }

    /// Rank 0 does the work that must happen exactly once.
    pub fn is_leader(&self) -> bool {
        self.rank == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_outside_a_launcher() {
        assert_eq!(MpiRank::from_vars(lookup(&[])), None);
        // A rank without a size is not enough.
        assert_eq!(MpiRank::from_vars(lookup(&[("PMI_RANK", "3")])), None);
    }

    #[test]
    fn test_launcher_variables() {
        let open_mpi = MpiRank::from_vars(lookup(&[
            ("OMPI_COMM_WORLD_RANK", "0"),
            ("OMPI_COMM_WORLD_SIZE", "200"),
            ("SLURM_PROCID", "7"),
            ("SLURM_NTASKS", "200"),
        ]))
        .unwrap();
        assert_eq!(open_mpi, MpiRank { rank: 0, size: 200 });
        assert!(open_mpi.is_leader());

        let srun = MpiRank::from_vars(lookup(&[("SLURM_PROCID", "7"), ("SLURM_NTASKS", "200")])).unwrap();
        assert_eq!(srun.rank, 7);
        assert!(!srun.is_leader());
    }

    #[test]
    fn test_invalid_values_fall_through() {
        let rank = MpiRank::from_vars(lookup(&[
            ("PMI_RANK", "x"),
            ("PMI_SIZE", "4"),
            ("SLURM_PROCID", "1"),
            ("SLURM_NTASKS", "4"),
        ]));
        assert_eq!(rank, Some(MpiRank { rank: 1, size: 4 }));
        assert_eq!(
            MpiRank::from_vars(lookup(&[("PMI_RANK", "4"), ("PMI_SIZE", "4")])),
            None
        );
    }
}
