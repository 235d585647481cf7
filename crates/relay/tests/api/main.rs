mod gfs_routes;
mod helpers;
