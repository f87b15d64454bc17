pub use {adjustp,
         anyhow,
         itertools,
         log,
         pretty_env_logger,
         rand,
         rand_chacha,
         rand_distr,
         rayon,
         serde,
         serde_json,
         statrs};
