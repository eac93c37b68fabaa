mod buckets;
mod dry_run;
mod logging;
mod transfer;
